//! The chunk engine of a tensor leaf.
//!
//! A leaf with `n` samples and per-sample maximum shape `m` is stored as an array of shape `[n, m...]` on a regular chunk grid.
//! Each chunk is stored at `<leaf>/__chunks/<i.j.k>` as little-endian elements encoded by the leaf compressor.
//! Missing chunks read as zeros and chunks that become all zeros are erased.
//!
//! Leaves with dynamic axes keep the actual extent of those axes for every sample in a side table,
//! itself a `uint64` chunked array stored under `<leaf>/__shapes/`.

mod chunk_cache;

use std::sync::Arc;

use hub_storage::{ReadableWritableListableStorage, StorageError, StoreKey, StorePrefix};
use itertools::{Itertools, izip};
use rayon::prelude::*;

use chunk_cache::ChunkCache;

use crate::{
    DatasetError,
    codec::{ChunkCodecTraits, CodecError, decode_chunk, encode_chunk},
    config::global_config,
    data_type::DataType,
    region::{Region, copy_region},
    schema::TensorSpec,
    slice::{IndexError, Selector, extract_info},
    tensor_data::{TensorData, num_elements, squeezed, swap_to_from_little_endian, usize_from},
};

/// The number of samples per chunk of a dynamic shape side table.
const SHAPE_CHUNK_SAMPLES: u64 = 4096;

/// The result of reading a range of samples.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SampleBatch {
    /// Samples of a static leaf stacked along a leading axis.
    Stacked(TensorData),
    /// Samples of a dynamic leaf, one tensor per sample.
    Ragged(Vec<TensorData>),
}

/// The resolved selection of an inner axis for one sample.
#[derive(Debug, Clone, Copy)]
struct AxisRegion {
    start: u64,
    len: u64,
    /// The axis is kept in the result (it was not selected by an integer).
    keep: bool,
    /// The extent of the axis follows the sample (a dynamic axis selected implicitly).
    free: bool,
}

pub(crate) struct ChunkEngine {
    storage: ReadableWritableListableStorage,
    prefix: StorePrefix,
    chunk_prefix: StorePrefix,
    data_type: DataType,
    shape: Vec<Option<u64>>,
    max_shape: Vec<u64>,
    chunks: Vec<u64>,
    codec: Result<Option<Arc<dyn ChunkCodecTraits>>, CodecError>,
    len: u64,
    shapes: Option<Box<ChunkEngine>>,
    cache: ChunkCache,
}

fn shapes_match(value_shape: &[u64], region_shape: &[u64]) -> bool {
    value_shape == region_shape || squeezed(value_shape) == squeezed(region_shape)
}

fn value_shape_error(value_shape: &[u64], region_shape: &[u64]) -> DatasetError {
    DatasetError::ValueShape(format!(
        "a value of shape {value_shape:?} cannot be assigned to a region of shape {region_shape:?}"
    ))
}

impl ChunkEngine {
    /// Create the engine of `spec` stored under `prefix`.
    pub(crate) fn new(
        storage: ReadableWritableListableStorage,
        prefix: StorePrefix,
        spec: &TensorSpec,
        len: u64,
    ) -> Result<Self, DatasetError> {
        let (cache_capacity, default_compressor, chunk_target_bytes) = {
            let config = global_config();
            (
                config.chunk_cache_capacity(),
                config.default_compressor(),
                config.chunk_target_bytes(),
            )
        };
        let dynamic_axes = spec.dynamic_axes();
        let shapes = if dynamic_axes.is_empty() {
            None
        } else {
            let num_dynamic = dynamic_axes.len() as u64;
            let shape_prefix = prefix.child("__shapes").map_err(StorageError::from)?;
            Some(Box::new(Self {
                storage: storage.clone(),
                chunk_prefix: shape_prefix.child("__chunks").map_err(StorageError::from)?,
                prefix: shape_prefix,
                data_type: DataType::UInt64,
                shape: vec![Some(num_dynamic)],
                max_shape: vec![num_dynamic],
                chunks: vec![SHAPE_CHUNK_SAMPLES, num_dynamic],
                codec: Ok(None),
                len,
                shapes: None,
                cache: ChunkCache::new(cache_capacity),
            }))
        };
        let compressor = spec.compressor().unwrap_or(default_compressor);
        Ok(Self {
            storage,
            chunk_prefix: prefix.child("__chunks").map_err(StorageError::from)?,
            prefix,
            data_type: spec.data_type(),
            shape: spec.shape().to_vec(),
            max_shape: spec.max_shape().to_vec(),
            chunks: spec.full_chunks(chunk_target_bytes),
            codec: compressor.codec(),
            len,
            shapes,
            cache: ChunkCache::new(cache_capacity),
        })
    }

    pub(crate) fn is_dynamic(&self) -> bool {
        self.shapes.is_some()
    }

    /// The number of samples per chunk.
    pub(crate) fn sample_chunk(&self) -> u64 {
        self.chunks[0]
    }

    fn element_size(&self) -> usize {
        self.data_type.size()
    }

    fn chunk_key(&self, chunk_indices: &[u64]) -> Result<StoreKey, StorageError> {
        Ok(self.chunk_prefix.key(&chunk_indices.iter().join("."))?)
    }

    fn chunk_num_bytes(&self) -> usize {
        usize_from(num_elements(&self.chunks)) * self.element_size()
    }

    fn codec(&self) -> Result<Option<&Arc<dyn ChunkCodecTraits>>, CodecError> {
        self.codec.as_ref().map(Option::as_ref).map_err(Clone::clone)
    }

    /// Retrieve a decoded chunk in native byte order, [`None`] if it is not stored.
    fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Option<Arc<Vec<u8>>>, DatasetError> {
        if let Some(chunk) = self.cache.get(chunk_indices) {
            return Ok(Some(chunk));
        }
        let key = self.chunk_key(chunk_indices)?;
        let Some(encoded) = self.storage.get(&key)? else {
            return Ok(None);
        };
        let mut decoded = decode_chunk(self.codec()?, &encoded, self.chunk_num_bytes())?;
        swap_to_from_little_endian(&mut decoded, self.element_size());
        let decoded = Arc::new(decoded);
        self.cache.insert(chunk_indices, decoded.clone());
        Ok(Some(decoded))
    }

    /// Store a decoded chunk in native byte order, erasing it if it is all zeros.
    fn store_chunk(&self, chunk_indices: &[u64], decoded: Vec<u8>) -> Result<(), DatasetError> {
        let key = self.chunk_key(chunk_indices)?;
        if decoded.iter().all(|&byte| byte == 0) {
            self.cache.remove(chunk_indices);
            self.storage.erase(&key)?;
            return Ok(());
        }
        let mut encoded = decoded.clone();
        self.cache.insert(chunk_indices, Arc::new(decoded));
        swap_to_from_little_endian(&mut encoded, self.element_size());
        let encoded = encode_chunk(self.codec()?, encoded)?;
        self.storage.set(&key, encoded.into())?;
        Ok(())
    }

    /// Read the elements of `region` in native byte order.
    fn read_region(&self, region: &Region) -> Result<Vec<u8>, DatasetError> {
        let element_size = self.element_size();
        let mut out = vec![0u8; usize_from(region.num_elements()) * element_size];
        let chunks = region
            .chunks(&self.chunks)
            .into_par_iter()
            .map(|chunk_indices| {
                let chunk = self.retrieve_chunk(&chunk_indices)?;
                Ok((chunk_indices, chunk))
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;
        for (chunk_indices, chunk) in chunks {
            let Some(chunk) = chunk else { continue };
            let chunk_region = Region::chunk(&chunk_indices, &self.chunks);
            let overlap = region.overlap(&chunk_region);
            copy_region(
                &chunk,
                &self.chunks,
                overlap.relative_to(chunk_region.start()).start(),
                &mut out,
                region.shape(),
                overlap.relative_to(region.start()).start(),
                overlap.shape(),
                element_size,
            );
        }
        Ok(out)
    }

    /// Write native-endian `bytes` to `region`.
    fn write_region(&self, region: &Region, bytes: &[u8]) -> Result<(), DatasetError> {
        let element_size = self.element_size();
        region
            .chunks(&self.chunks)
            .into_par_iter()
            .try_for_each(|chunk_indices| {
                let chunk_region = Region::chunk(&chunk_indices, &self.chunks);
                let overlap = region.overlap(&chunk_region);
                let mut chunk = if overlap == chunk_region {
                    vec![0u8; self.chunk_num_bytes()]
                } else {
                    self.retrieve_chunk(&chunk_indices)?.map_or_else(
                        || vec![0u8; self.chunk_num_bytes()],
                        |chunk| chunk.as_ref().clone(),
                    )
                };
                copy_region(
                    bytes,
                    region.shape(),
                    overlap.relative_to(region.start()).start(),
                    &mut chunk,
                    &self.chunks,
                    overlap.relative_to(chunk_region.start()).start(),
                    overlap.shape(),
                    element_size,
                );
                self.store_chunk(&chunk_indices, chunk)
            })
    }

    fn check_samples(&self, start: u64, stop: u64) -> Result<(), IndexError> {
        if stop > self.len || start > stop {
            Err(IndexError::SliceOutOfBounds {
                start: i64::try_from(start).unwrap_or(i64::MAX),
                stop: i64::try_from(stop).unwrap_or(i64::MAX),
                size: self.len,
            })
        } else {
            Ok(())
        }
    }

    fn check_sample(&self, sample: u64) -> Result<(), IndexError> {
        if sample < self.len {
            Ok(())
        } else {
            Err(IndexError::OutOfBounds {
                index: i64::try_from(sample).unwrap_or(i64::MAX),
                size: self.len,
            })
        }
    }

    /// Combine the stored extents of the dynamic axes with the static axes.
    fn merge_extents(&self, extents: &[u64]) -> Vec<u64> {
        let mut extents = extents.iter();
        self.shape
            .iter()
            .map(|size| size.unwrap_or_else(|| extents.next().copied().unwrap_or(0)))
            .collect()
    }

    /// The actual per-sample shape of `sample`.
    pub(crate) fn sample_shape(&self, sample: u64) -> Result<Vec<u64>, DatasetError> {
        self.check_sample(sample)?;
        Ok(self
            .sample_shapes(sample, sample + 1)?
            .pop()
            .unwrap_or_default())
    }

    /// The actual per-sample shapes of the samples `start..stop`.
    pub(crate) fn sample_shapes(
        &self,
        start: u64,
        stop: u64,
    ) -> Result<Vec<Vec<u64>>, DatasetError> {
        self.check_samples(start, stop)?;
        let Some(shapes) = &self.shapes else {
            return Ok(vec![self.max_shape.clone(); usize_from(stop - start)]);
        };
        let num_dynamic = shapes.max_shape[0];
        let region = Region::from([start..stop, 0..num_dynamic]);
        let table = TensorData::new(
            DataType::UInt64,
            region.shape().to_vec(),
            shapes.read_region(&region)?,
        )?;
        let extents = table.to_vec::<u64>()?;
        Ok(extents
            .chunks(usize_from(num_dynamic).max(1))
            .map(|extents| self.merge_extents(extents))
            .collect())
    }

    fn resolve_inner(
        &self,
        inner: &[Selector],
        actual: &[u64],
    ) -> Result<Vec<AxisRegion>, IndexError> {
        if inner.len() > self.shape.len() {
            return Err(IndexError::TooManyIndices {
                given: inner.len() + 1,
                axes: self.shape.len() + 1,
            });
        }
        izip!(&self.shape, &self.max_shape, actual)
            .enumerate()
            .map(|(axis, (size, &max_size, &actual_size))| {
                let selector = inner.get(axis).copied().unwrap_or(Selector::Slice {
                    start: None,
                    stop: None,
                    step: None,
                });
                if size.is_none() && selector.is_full() {
                    Ok(AxisRegion {
                        start: 0,
                        len: actual_size,
                        keep: true,
                        free: true,
                    })
                } else {
                    let info = extract_info(&selector, max_size)?;
                    Ok(AxisRegion {
                        start: info.start,
                        len: info.len(),
                        keep: !info.is_index,
                        free: false,
                    })
                }
            })
            .collect()
    }

    fn sample_region(sample_start: u64, sample_count: u64, axes: &[AxisRegion]) -> Region {
        Region::new_with_start_shape(
            std::iter::once(sample_start)
                .chain(axes.iter().map(|axis| axis.start))
                .collect(),
            std::iter::once(sample_count)
                .chain(axes.iter().map(|axis| axis.len))
                .collect(),
        )
    }

    fn read_sample_with_shape(
        &self,
        sample: u64,
        inner: &[Selector],
        actual: &[u64],
    ) -> Result<TensorData, DatasetError> {
        let axes = self.resolve_inner(inner, actual)?;
        let region = Self::sample_region(sample, 1, &axes);
        let bytes = if region.is_empty() {
            Vec::new()
        } else {
            self.read_region(&region)?
        };
        let shape = axes.iter().filter(|axis| axis.keep).map(|axis| axis.len).collect();
        Ok(TensorData::new(self.data_type, shape, bytes)?)
    }

    /// Read the selection `inner` of one sample.
    pub(crate) fn read_sample(
        &self,
        sample: u64,
        inner: &[Selector],
    ) -> Result<TensorData, DatasetError> {
        let actual = self.sample_shape(sample)?;
        self.read_sample_with_shape(sample, inner, &actual)
    }

    /// Read the selection `inner` of the samples `start..stop`.
    pub(crate) fn read_samples(
        &self,
        start: u64,
        stop: u64,
        inner: &[Selector],
    ) -> Result<SampleBatch, DatasetError> {
        self.check_samples(start, stop)?;
        if self.is_dynamic() {
            let shapes = self.sample_shapes(start, stop)?;
            let samples = (start..stop)
                .zip(&shapes)
                .map(|(sample, actual)| self.read_sample_with_shape(sample, inner, actual))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(SampleBatch::Ragged(samples));
        }
        let axes = self.resolve_inner(inner, &self.max_shape)?;
        let region = Self::sample_region(start, stop - start, &axes);
        let bytes = if region.is_empty() {
            Vec::new()
        } else {
            self.read_region(&region)?
        };
        let shape = std::iter::once(stop - start)
            .chain(axes.iter().filter(|axis| axis.keep).map(|axis| axis.len))
            .collect();
        Ok(SampleBatch::Stacked(TensorData::new(self.data_type, shape, bytes)?))
    }

    /// Write `data` to the selection `inner` of one sample.
    ///
    /// Implicitly selected dynamic axes take their extent from `data`.
    /// A zero dimensional `data` is broadcast over the selection.
    pub(crate) fn write_sample(
        &self,
        sample: u64,
        inner: &[Selector],
        data: &TensorData,
    ) -> Result<(), DatasetError> {
        let data = data.cast(self.data_type)?;
        let actual = self.sample_shape(sample)?;
        let mut axes = self.resolve_inner(inner, &actual)?;
        let kept = axes
            .iter()
            .positions(|axis| axis.keep)
            .collect_vec();
        let has_free = kept.iter().any(|&axis| axes[axis].free);
        let broadcast = data.rank() == 0 || (!has_free && data.is_scalar());
        if broadcast {
            for axis in axes.iter_mut().filter(|axis| axis.free) {
                axis.len = axis.len.max(1);
            }
        } else if has_free {
            if data.rank() != kept.len() {
                let region_shape = kept.iter().map(|&axis| axes[axis].len).collect_vec();
                return Err(value_shape_error(data.shape(), &region_shape));
            }
            for (&axis, &size) in kept.iter().zip(data.shape()) {
                if axes[axis].free {
                    axes[axis].len = size;
                } else if axes[axis].len != size {
                    let region_shape = kept.iter().map(|&axis| axes[axis].len).collect_vec();
                    return Err(value_shape_error(data.shape(), &region_shape));
                }
            }
        } else {
            let region_shape = kept.iter().map(|&axis| axes[axis].len).collect_vec();
            if !shapes_match(data.shape(), &region_shape) {
                return Err(value_shape_error(data.shape(), &region_shape));
            }
        }
        for (axis, max_size) in axes.iter().zip(&self.max_shape) {
            if axis.free && axis.len > *max_size {
                return Err(DatasetError::ValueShape(format!(
                    "a value of shape {:?} exceeds the max_shape {:?}",
                    data.shape(),
                    self.max_shape
                )));
            }
        }

        let region = Self::sample_region(sample, 1, &axes);
        if !region.is_empty() {
            if broadcast {
                let filled = TensorData::broadcast_scalar(&data, region.shape().to_vec())?;
                self.write_region(&region, filled.bytes())?;
            } else {
                self.write_region(&region, data.bytes())?;
            }
        }

        if let Some(shapes) = &self.shapes {
            let extents = izip!(&self.shape, &axes, &actual)
                .filter(|(size, _, _)| size.is_none())
                .map(|(_, axis, &actual_size)| {
                    let written = if axis.len > 0 { axis.start + axis.len } else { 0 };
                    actual_size.max(written)
                })
                .collect_vec();
            let stored = izip!(&self.shape, &actual)
                .filter_map(|(size, &actual_size)| size.is_none().then_some(actual_size))
                .collect_vec();
            if extents != stored {
                let region = Region::from([sample..sample + 1, 0..extents.len() as u64]);
                shapes.write_region(&region, bytemuck::cast_slice(&extents))?;
            }
        }
        Ok(())
    }

    /// Write `data` to the selection `inner` of the samples `start..stop`.
    ///
    /// For static leaves `data` covers the whole region, for dynamic leaves its leading axis enumerates the samples.
    /// A single element is broadcast.
    pub(crate) fn write_samples(
        &self,
        start: u64,
        stop: u64,
        inner: &[Selector],
        data: &TensorData,
    ) -> Result<(), DatasetError> {
        self.check_samples(start, stop)?;
        let count = stop - start;
        if self.is_dynamic() {
            if data.rank() == 0 {
                return (start..stop).try_for_each(|sample| self.write_sample(sample, inner, data));
            }
            if data.shape()[0] == count {
                let samples = data.split_axis0()?;
                return (start..stop)
                    .zip(&samples)
                    .try_for_each(|(sample, data)| self.write_sample(sample, inner, data));
            }
            if count == 1 {
                return self.write_sample(start, inner, data);
            }
            return Err(DatasetError::ValueShape(format!(
                "a value of shape {:?} cannot be split into {count} samples",
                data.shape()
            )));
        }

        let data = data.cast(self.data_type)?;
        let axes = self.resolve_inner(inner, &self.max_shape)?;
        let region = Self::sample_region(start, count, &axes);
        let region_shape = std::iter::once(count)
            .chain(axes.iter().filter(|axis| axis.keep).map(|axis| axis.len))
            .collect_vec();
        if region.is_empty() {
            return Ok(());
        }
        if data.is_scalar() && region.num_elements() != 1 {
            let filled = TensorData::broadcast_scalar(&data, region.shape().to_vec())?;
            self.write_region(&region, filled.bytes())
        } else if shapes_match(data.shape(), &region_shape) {
            self.write_region(&region, data.bytes())
        } else {
            Err(value_shape_error(data.shape(), &region_shape))
        }
    }

    /// Set the number of samples.
    ///
    /// Samples beyond a reduced length are erased, so they read as zeros if the length grows again.
    pub(crate) fn resize(&mut self, len: u64) -> Result<(), DatasetError> {
        if len < self.len {
            let sample_chunk = self.chunks[0];
            let keys = self.storage.list_prefix(&self.chunk_prefix)?;
            let beyond = keys
                .into_iter()
                .filter(|key| {
                    key.strip_prefix(&self.chunk_prefix)
                        .and_then(|name| name.split('.').next())
                        .and_then(|index| index.parse::<u64>().ok())
                        .is_some_and(|index| index * sample_chunk >= len)
                })
                .collect_vec();
            self.storage.erase_values(&beyond)?;
            self.cache.clear();
            let boundary_end = len.next_multiple_of(sample_chunk).min(self.len);
            if boundary_end > len {
                let region = Region::new_with_start_shape(
                    std::iter::once(len)
                        .chain(std::iter::repeat_n(0, self.max_shape.len()))
                        .collect(),
                    std::iter::once(boundary_end - len)
                        .chain(self.max_shape.iter().copied())
                        .collect(),
                );
                let zeros = vec![0u8; usize_from(region.num_elements()) * self.element_size()];
                self.write_region(&region, &zeros)?;
            }
        }
        if let Some(shapes) = &mut self.shapes {
            shapes.resize(len)?;
        }
        self.len = len;
        Ok(())
    }

    /// Erase every key of the leaf.
    pub(crate) fn erase(&self) -> Result<(), DatasetError> {
        self.cache.clear();
        if let Some(shapes) = &self.shapes {
            shapes.cache.clear();
        }
        self.storage.erase_prefix(&self.prefix)?;
        Ok(())
    }
}

impl std::fmt::Debug for ChunkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkEngine")
            .field("prefix", &self.prefix)
            .field("data_type", &self.data_type)
            .field("shape", &self.shape)
            .field("chunks", &self.chunks)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use hub_storage::{ListableStorageTraits, store::MemoryStore};

    use super::*;
    use crate::codec::Compressor;

    fn new_engine(spec: &TensorSpec, len: u64) -> (Arc<MemoryStore>, ChunkEngine) {
        let store = Arc::new(MemoryStore::new());
        let spec = spec.resolved(Compressor::None, 1024);
        let engine =
            ChunkEngine::new(store.clone(), StorePrefix::new("t/").unwrap(), &spec, len).unwrap();
        (store, engine)
    }

    fn slice(start: i64, stop: i64) -> Selector {
        Selector::Slice {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    #[test]
    fn chunk_engine_static_read_write() {
        let spec = TensorSpec::new(&[4, 4])
            .with_data_type(DataType::UInt8)
            .with_chunks(vec![2, 2, 2]);
        let (store, engine) = new_engine(&spec, 5);
        let data = TensorData::from_elements(vec![3, 4, 4], &(0..48u8).collect_vec()).unwrap();
        engine.write_samples(1, 4, &[], &data).unwrap();
        let SampleBatch::Stacked(read) = engine.read_samples(1, 4, &[]).unwrap() else {
            panic!("expected a stacked batch")
        };
        assert_eq!(read, data);
        // sample 0 and 4 are untouched
        assert!(engine.read_sample(0, &[]).unwrap().is_zero());
        assert!(engine.read_sample(4, &[]).unwrap().is_zero());
        // a sub-region
        let sub = engine.read_sample(2, &[Selector::Index(1), slice(1, 3)]).unwrap();
        assert_eq!(sub.shape(), &[2]);
        assert_eq!(sub.bytes(), &[16 + 5, 16 + 6]);
        // chunks are keyed by grid indices
        assert!(store.list().unwrap().contains(&StoreKey::new("t/__chunks/0.0.0").unwrap()));
        assert!(engine.read_samples(3, 6, &[]).is_err());
    }

    #[test]
    fn chunk_engine_zero_chunks_are_erased() {
        let spec = TensorSpec::new(&[2]).with_data_type(DataType::Int32);
        let (store, engine) = new_engine(&spec, 4);
        engine.write_sample(1, &[], &TensorData::from_scalar(5i32)).unwrap();
        assert_eq!(store.len(), 1);
        engine.write_sample(1, &[], &TensorData::from_scalar(0i32)).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn chunk_engine_broadcast_and_cast() {
        let spec = TensorSpec::new(&[1]);
        let (_store, engine) = new_engine(&spec, 3);
        engine.write_sample(0, &[], &TensorData::from_scalar(0.2f64)).unwrap();
        assert_eq!(engine.read_sample(0, &[]).unwrap().to_vec::<f64>().unwrap(), vec![0.2]);
        engine.write_samples(1, 3, &[], &TensorData::from_scalar(7u8)).unwrap();
        assert_eq!(engine.read_sample(2, &[]).unwrap().to_vec::<f64>().unwrap(), vec![7.0]);
        // unit axes are ignored when matching shapes
        let spec = TensorSpec::new(&[1]).with_data_type(DataType::UInt8);
        let (_store, engine) = new_engine(&spec, 100);
        engine.write_samples(0, 100, &[], &TensorData::from_vec(vec![1u8; 100])).unwrap();
        assert!(matches!(
            engine.write_samples(0, 100, &[], &TensorData::from_vec(vec![1u8; 99])),
            Err(DatasetError::ValueShape(_))
        ));
    }

    #[test]
    fn chunk_engine_dynamic() {
        let spec =
            TensorSpec::new_dynamic(&[None, Some(2)], &[10, 2]).with_data_type(DataType::UInt16);
        let (_store, engine) = new_engine(&spec, 3);
        assert_eq!(engine.sample_shape(0).unwrap(), vec![0, 2]);
        let data = TensorData::from_elements(vec![3, 2], &[1u16, 2, 3, 4, 5, 6]).unwrap();
        engine.write_sample(1, &[], &data).unwrap();
        assert_eq!(engine.sample_shape(1).unwrap(), vec![3, 2]);
        assert_eq!(engine.read_sample(1, &[]).unwrap(), data);
        // explicit ranges grow the extent
        engine.write_sample(0, &[slice(4, 5)], &TensorData::from_vec(vec![9u16, 9])).unwrap();
        assert_eq!(engine.sample_shape(0).unwrap(), vec![5, 2]);
        // explicit ranges read beyond the extent
        let read = engine.read_sample(2, &[slice(7, 10), Selector::Index(1)]).unwrap();
        assert_eq!(read.shape(), &[3]);
        // implicit reads are clipped
        let SampleBatch::Ragged(samples) = engine.read_samples(0, 3, &[]).unwrap() else {
            panic!("expected a ragged batch")
        };
        assert_eq!(
            samples.iter().map(|sample| sample.shape().to_vec()).collect_vec(),
            vec![vec![5, 2], vec![3, 2], vec![0, 2]]
        );
        // the extent never exceeds the max shape
        let data = TensorData::zeros(DataType::UInt16, vec![11, 2]);
        assert!(matches!(engine.write_sample(2, &[], &data), Err(DatasetError::ValueShape(_))));
        // batches are split along the leading axis
        let batch = TensorData::from_elements(vec![2, 1, 2], &[1u16, 1, 2, 2]).unwrap();
        engine.write_samples(1, 3, &[], &batch).unwrap();
        assert_eq!(engine.sample_shape(2).unwrap(), vec![1, 2]);
        assert_eq!(engine.sample_shape(1).unwrap(), vec![3, 2]);
    }

    #[test]
    fn chunk_engine_resize() {
        let spec = TensorSpec::new(&[]).with_data_type(DataType::UInt8).with_chunks(vec![4]);
        let (store, mut engine) = new_engine(&spec, 10);
        engine.write_samples(0, 10, &[], &TensorData::from_vec(vec![1u8; 10])).unwrap();
        assert_eq!(store.len(), 3);
        engine.resize(5).unwrap();
        assert_eq!(store.len(), 2);
        engine.resize(12).unwrap();
        let SampleBatch::Stacked(read) = engine.read_samples(0, 12, &[]).unwrap() else {
            panic!("expected a stacked batch")
        };
        assert_eq!(read.bytes(), &[1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0]);
        engine.erase().unwrap();
        assert!(store.is_empty());
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn chunk_engine_compressed() {
        let store = Arc::new(MemoryStore::new());
        let spec = TensorSpec::new(&[8])
            .with_data_type(DataType::Float32)
            .resolved(Compressor::Lz4, 1024);
        let engine = ChunkEngine::new(store.clone(), StorePrefix::root(), &spec, 2).unwrap();
        let data = TensorData::from_vec((0..8).map(|i| i as f32).collect_vec());
        engine.write_sample(1, &[], &data).unwrap();
        let engine = ChunkEngine::new(store, StorePrefix::root(), &spec, 2).unwrap();
        assert_eq!(engine.read_sample(1, &[]).unwrap(), data);
    }
}
