//! Regions of n-dimensional arrays.
//!
//! A [`Region`] is a hyperrectangle given by a start and a shape.
//! The chunk engine reads and writes regions of a tensor that span the sample axis and the inner axes.

use std::ops::Range;

use itertools::{Itertools, izip};

use crate::tensor_data::usize_from;

/// A hyperrectangular region of an array.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Region {
    start: Vec<u64>,
    shape: Vec<u64>,
}

impl<T: IntoIterator<Item = Range<u64>>> From<T> for Region {
    fn from(ranges: T) -> Self {
        let (start, shape) = ranges
            .into_iter()
            .map(|range| (range.start, range.end.saturating_sub(range.start)))
            .unzip();
        Self { start, shape }
    }
}

impl Region {
    /// Create a region from a start and a shape of equal length.
    #[must_use]
    pub fn new_with_start_shape(start: Vec<u64>, shape: Vec<u64>) -> Self {
        debug_assert_eq!(start.len(), shape.len());
        Self { start, shape }
    }

    /// Create a region with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: Vec<u64>) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// The start of the region.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// The shape of the region.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The exclusive end of the region.
    #[must_use]
    pub fn end_exc(&self) -> Vec<u64> {
        izip!(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// The region as a range per axis.
    #[must_use]
    pub fn to_ranges(&self) -> Vec<Range<u64>> {
        izip!(&self.start, &self.shape)
            .map(|(&start, &size)| start..start + size)
            .collect()
    }

    /// The number of dimensions.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// The number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns true if the region contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// The intersection of two regions of equal dimensionality.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Self {
        izip!(&self.start, &self.shape, &other.start, &other.shape)
            .map(|(&start, &size, &other_start, &other_size)| {
                let overlap_start = start.max(other_start);
                let overlap_end = (start + size).min(other_start + other_size);
                overlap_start..overlap_end.max(overlap_start)
            })
            .into()
    }

    /// The region relative to `offset`.
    #[must_use]
    pub fn relative_to(&self, offset: &[u64]) -> Self {
        Self {
            start: izip!(&self.start, offset)
                .map(|(start, offset)| start.saturating_sub(*offset))
                .collect(),
            shape: self.shape.clone(),
        }
    }

    /// The indices of the chunks of a regular grid with `chunk_shape` that intersect the region.
    #[must_use]
    pub fn chunks(&self, chunk_shape: &[u64]) -> Vec<Vec<u64>> {
        if self.is_empty() {
            return Vec::new();
        }
        izip!(&self.start, &self.shape, chunk_shape)
            .map(|(&start, &size, &chunk)| start / chunk..(start + size).div_ceil(chunk))
            .multi_cartesian_product()
            .collect()
    }

    /// The region covered by the chunk at `chunk_indices` of a regular grid with `chunk_shape`.
    #[must_use]
    pub fn chunk(chunk_indices: &[u64], chunk_shape: &[u64]) -> Self {
        Self {
            start: izip!(chunk_indices, chunk_shape)
                .map(|(index, chunk)| index * chunk)
                .collect(),
            shape: chunk_shape.to_vec(),
        }
    }
}

fn strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Copy a region of `extent` elements between two row-major buffers.
///
/// The region starts at `src_start` in `src` (with `src_shape`) and at `dst_start` in `dst` (with `dst_shape`).
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_region(
    src: &[u8],
    src_shape: &[u64],
    src_start: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_start: &[u64],
    extent: &[u64],
    element_size: usize,
) {
    if extent.contains(&0) {
        return;
    }
    let rank = extent.len();
    if rank == 0 {
        dst[..element_size].copy_from_slice(&src[..element_size]);
        return;
    }
    let src_strides = strides(src_shape);
    let dst_strides = strides(dst_shape);
    let run = usize_from(extent[rank - 1]) * element_size;
    let mut index = vec![0u64; rank];
    loop {
        let src_offset: u64 = izip!(&index, src_start, &src_strides)
            .map(|(i, start, stride)| (i + start) * stride)
            .sum();
        let dst_offset: u64 = izip!(&index, dst_start, &dst_strides)
            .map(|(i, start, stride)| (i + start) * stride)
            .sum();
        let src_offset = usize_from(src_offset) * element_size;
        let dst_offset = usize_from(dst_offset) * element_size;
        dst[dst_offset..dst_offset + run].copy_from_slice(&src[src_offset..src_offset + run]);

        // advance over all but the last axis
        let mut axis = rank - 1;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < extent[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}
