//! Tensor leaves.
//!
//! A [`Tensor`] couples the [`TensorSpec`] of a leaf with its [`ChunkEngine`] and converts between [`Value`]s and stored elements.
//! Text leaves store character codes, class label leaves store integer codes.

use hub_storage::{ReadableWritableListableStorage, StorePrefix};
use itertools::Itertools;

use crate::{
    DatasetError,
    chunk_engine::{ChunkEngine, SampleBatch},
    data_type::DataType,
    schema::{ClassLabel, TensorKind, TensorSpec},
    slice::Selector,
    tensor_data::{TensorData, usize_from},
    value::Value,
};

/// Options for materializing values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputeOptions {
    /// Map class label codes to their names.
    pub label_name: bool,
}

pub(crate) struct Tensor {
    spec: TensorSpec,
    engine: ChunkEngine,
}

/// Split ascending `samples` into runs of consecutive indices.
pub(crate) fn contiguous_runs(samples: &[u64]) -> Vec<(u64, u64)> {
    samples
        .iter()
        .copied()
        .enumerate()
        .chunk_by(|(position, sample)| sample.wrapping_sub(*position as u64))
        .into_iter()
        .filter_map(|(_, run)| {
            let run = run.map(|(_, sample)| sample).collect_vec();
            Some((*run.first()?, *run.last()? + 1))
        })
        .collect()
}

fn type_error(expected: &str, value: &Value) -> DatasetError {
    DatasetError::Type(format!("expected {expected}, got a {}", value.kind_name()))
}

/// Decode the codes of a text sample, ignoring trailing zero codes.
fn decode_text(codes: &TensorData) -> Result<String, DatasetError> {
    if codes.data_type() == DataType::UInt8 {
        let mut bytes = codes.bytes().to_vec();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        return String::from_utf8(bytes).map_err(|err| DatasetError::Value(err.to_string()));
    }
    let mut codes = codes.to_vec::<u32>()?;
    while codes.last() == Some(&0) {
        codes.pop();
    }
    codes
        .iter()
        .map(|&code| {
            char::from_u32(code)
                .ok_or_else(|| DatasetError::Value(format!("{code} is not a valid character code")))
        })
        .collect()
}

impl Tensor {
    pub(crate) fn new(
        storage: ReadableWritableListableStorage,
        prefix: StorePrefix,
        spec: TensorSpec,
        len: u64,
    ) -> Result<Self, DatasetError> {
        let engine = ChunkEngine::new(storage, prefix, &spec, len)?;
        Ok(Self { spec, engine })
    }

    pub(crate) fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub(crate) fn sample_shape(&self, sample: u64) -> Result<Vec<u64>, DatasetError> {
        self.engine.sample_shape(sample)
    }

    pub(crate) fn resize(&mut self, len: u64) -> Result<(), DatasetError> {
        self.engine.resize(len)
    }

    pub(crate) fn erase(&self) -> Result<(), DatasetError> {
        self.engine.erase()
    }

    fn is_text(&self) -> bool {
        *self.spec.kind() == TensorKind::Text
    }

    fn class_label(&self) -> Option<&ClassLabel> {
        self.spec.class_label()
    }

    fn text_codes(&self, text: &str) -> TensorData {
        if self.spec.data_type() == DataType::UInt8 {
            TensorData::from_vec(text.as_bytes().to_vec())
        } else {
            TensorData::from_vec(text.chars().map(u32::from).collect_vec())
        }
    }

    fn check_codes(&self, codes: &TensorData) -> Result<(), DatasetError> {
        let Some(class_label) = self.class_label() else {
            return Ok(());
        };
        let num_classes = class_label.num_classes();
        #[allow(clippy::cast_precision_loss)]
        let upper = num_classes as f64;
        for code in codes.to_f64_vec() {
            if code < 0.0 || code >= upper || code.fract() != 0.0 {
                return Err(DatasetError::ClassLabelValue(format!(
                    "{code} is not a class code in [0, {num_classes})"
                )));
            }
        }
        Ok(())
    }

    fn label_code(&self, class_label: &ClassLabel, name: &str) -> Result<TensorData, DatasetError> {
        if class_label.names().is_none() {
            return Err(DatasetError::Value(format!(
                "cannot assign the name '{name}' to a class label without names"
            )));
        }
        let code = class_label.str2int(name).ok_or_else(|| {
            DatasetError::ClassLabelValue(format!("'{name}' is not one of the class names"))
        })?;
        Ok(TensorData::from_scalar(code).cast(self.spec.data_type())?)
    }

    /// Convert a value to elements of the leaf.
    fn to_data(&self, value: &Value) -> Result<TensorData, DatasetError> {
        let data = match value {
            Value::Array(data) => data.cast(self.spec.data_type())?,
            Value::Text(text) => match self.class_label() {
                Some(class_label) => self.label_code(class_label, text)?,
                None if self.is_text() => self.text_codes(text).cast(self.spec.data_type())?,
                None => return Err(type_error("an array", value)),
            },
            Value::List(items) if !items.is_empty() => {
                let items = items
                    .iter()
                    .map(|item| self.to_data(item))
                    .collect::<Result<Vec<_>, _>>()?;
                TensorData::stack(&items).map_err(|_| {
                    DatasetError::ValueShape(
                        "the items of a list have different shapes".to_string(),
                    )
                })?
            }
            Value::List(_) => TensorData::zeros(self.spec.data_type(), vec![0]),
            Value::Dict(_) => return Err(type_error("an array", value)),
        };
        self.check_codes(&data)?;
        Ok(data)
    }

    /// Convert stored elements of a sample selection to a value.
    fn to_value(&self, data: TensorData, options: ComputeOptions) -> Result<Value, DatasetError> {
        if self.is_text() && data.rank() == 1 {
            return Ok(Value::Text(decode_text(&data)?));
        }
        match self.class_label() {
            Some(class_label) if options.label_name && class_label.names().is_some() => {
                if data.rank() == 0 {
                    let code = data.to_vec::<u64>()?.first().copied().unwrap_or_default();
                    let name = class_label.int2str(code).ok_or_else(|| {
                        DatasetError::ClassLabelValue(format!("{code} is not a class code"))
                    })?;
                    Ok(Value::Text(name.to_string()))
                } else {
                    data.split_axis0()?
                        .into_iter()
                        .map(|item| self.to_value(item, options))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::List)
                }
            }
            _ => Ok(Value::Array(data)),
        }
    }

    /// Whether a whole-sample value is materialized per sample rather than as one array.
    fn reads_per_sample(&self, options: ComputeOptions) -> bool {
        self.is_text()
            || (options.label_name
                && self.class_label().is_some_and(|label| label.names().is_some()))
    }

    pub(crate) fn read_sample(
        &self,
        sample: u64,
        inner: &[Selector],
        options: ComputeOptions,
    ) -> Result<Value, DatasetError> {
        let data = self.engine.read_sample(sample, inner)?;
        self.to_value(data, options)
    }

    /// Read the ascending `samples`.
    ///
    /// Static numeric leaves are stacked into one array, other leaves return a list with a value per sample.
    pub(crate) fn read_samples(
        &self,
        samples: &[u64],
        inner: &[Selector],
        options: ComputeOptions,
    ) -> Result<Value, DatasetError> {
        let runs = contiguous_runs(samples);
        if runs.is_empty() {
            return match self.engine.read_samples(0, 0, inner)? {
                SampleBatch::Stacked(data) if !self.reads_per_sample(options) => {
                    Ok(Value::Array(data))
                }
                _ => Ok(Value::List(Vec::new())),
            };
        }
        let mut stacked = Vec::new();
        let mut values = Vec::new();
        for (start, stop) in runs {
            match self.engine.read_samples(start, stop, inner)? {
                SampleBatch::Stacked(data) if !self.reads_per_sample(options) => stacked.push(data),
                SampleBatch::Stacked(data) => {
                    for item in data.split_axis0()? {
                        values.push(self.to_value(item, options)?);
                    }
                }
                SampleBatch::Ragged(items) => {
                    for item in items {
                        values.push(self.to_value(item, options)?);
                    }
                }
            }
        }
        if stacked.is_empty() {
            return Ok(Value::List(values));
        }
        if stacked.len() == 1 {
            return Ok(Value::Array(stacked.swap_remove(0)));
        }
        let items = stacked
            .iter()
            .map(TensorData::split_axis0)
            .flatten_ok()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(TensorData::stack(&items)?))
    }

    /// Pad text codes so that a shorter string replaces a longer one.
    fn pad_text(&self, sample: u64, codes: TensorData) -> Result<TensorData, DatasetError> {
        let len = codes.shape().first().copied().unwrap_or_default();
        let target = match self.spec.shape().first() {
            Some(Some(size)) => *size,
            _ => self.engine.sample_shape(sample)?.first().copied().unwrap_or_default(),
        };
        if len >= target {
            return Ok(codes);
        }
        let mut bytes = codes.into_bytes();
        bytes.resize(
            bytes.len() + usize_from(target - len) * self.spec.data_type().size(),
            0,
        );
        Ok(TensorData::new(self.spec.data_type(), vec![target], bytes)?)
    }

    pub(crate) fn write_sample(
        &self,
        sample: u64,
        inner: &[Selector],
        value: &Value,
    ) -> Result<(), DatasetError> {
        let mut data = self.to_data(value)?;
        if self.is_text()
            && matches!(value, Value::Text(_))
            && inner.iter().all(Selector::is_full)
        {
            data = self.pad_text(sample, data)?;
        }
        self.engine.write_sample(sample, inner, &data)
    }

    /// Write `value` to the ascending `samples`.
    ///
    /// A list with an item per sample is written item by item, a text or single element is broadcast
    /// and an array is split along its leading axis.
    pub(crate) fn write_samples(
        &self,
        samples: &[u64],
        inner: &[Selector],
        value: &Value,
    ) -> Result<(), DatasetError> {
        let count = samples.len() as u64;
        match value {
            Value::List(items) if items.len() == samples.len() => {
                return samples
                    .iter()
                    .zip(items)
                    .try_for_each(|(&sample, item)| self.write_sample(sample, inner, item));
            }
            Value::Text(_) => {
                return samples
                    .iter()
                    .try_for_each(|&sample| self.write_sample(sample, inner, value));
            }
            _ => {}
        }
        if count == 1 {
            return self.write_sample(samples[0], inner, value);
        }
        let data = self.to_data(value)?;
        let runs = contiguous_runs(samples);
        if let [(start, stop)] = runs[..] {
            return self.engine.write_samples(start, stop, inner, &data);
        }
        if data.rank() == 0 || (data.is_scalar() && data.shape().first() != Some(&count)) {
            return runs
                .into_iter()
                .try_for_each(|(start, stop)| self.engine.write_samples(start, stop, inner, &data));
        }
        if data.shape().first() != Some(&count) {
            return Err(DatasetError::ValueShape(format!(
                "a value of shape {:?} cannot be split into {count} samples",
                data.shape()
            )));
        }
        let items = data.split_axis0()?;
        samples
            .iter()
            .zip(&items)
            .try_for_each(|(&sample, item)| self.engine.write_sample(sample, inner, item))
    }

    /// The number of samples per chunk.
    pub(crate) fn sample_chunk(&self) -> u64 {
        self.engine.sample_chunk()
    }

    /// Copy the stored codes of `samples` to `destination`, starting at sample `offset`.
    pub(crate) fn copy_samples(
        &self,
        samples: &[u64],
        destination: &Self,
        offset: u64,
    ) -> Result<(), DatasetError> {
        let batch = usize::try_from(self.sample_chunk()).unwrap_or(usize::MAX).max(1);
        let mut target = offset;
        for batch in samples.chunks(batch) {
            for (start, stop) in contiguous_runs(batch) {
                match self.engine.read_samples(start, stop, &[])? {
                    SampleBatch::Stacked(data) => {
                        destination
                            .engine
                            .write_samples(target, target + stop - start, &[], &data)?;
                    }
                    SampleBatch::Ragged(items) => {
                        for (position, item) in items.iter().enumerate() {
                            destination.engine.write_sample(target + position as u64, &[], item)?;
                        }
                    }
                }
                target += stop - start;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("spec", &self.spec)
            .field("engine", &self.engine)
            .finish()
    }
}
