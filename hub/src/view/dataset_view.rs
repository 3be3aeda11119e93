use itertools::Itertools;

use super::{Child, Indexes, Item, SampleSet, Samples, TensorView, ViewState};
use crate::{
    Dataset, DatasetError,
    dataset::DatasetState,
    schema::{Schema, SchemaNode, SchemaNodeRef, format_max_shape, join_path},
    slice::IndexItem,
    tensor::ComputeOptions,
    value::{Record, Value},
};

/// A view of a dictionary node of a dataset.
#[derive(Debug, Clone)]
pub struct DatasetView {
    pub(crate) state: ViewState,
}

/// Split the value of a leaf read for `count` samples into a value per sample.
fn per_sample(value: Value, count: usize) -> Result<Vec<Value>, DatasetError> {
    let items = match value {
        Value::Array(data) if data.rank() > 0 => data
            .split_axis0()?
            .into_iter()
            .map(Value::Array)
            .collect_vec(),
        Value::List(items) => items,
        other => vec![other],
    };
    if items.len() == count {
        Ok(items)
    } else {
        Err(DatasetError::ValueShape(format!(
            "expected {count} samples, read {}",
            items.len()
        )))
    }
}

impl DatasetView {
    pub(crate) fn new(dataset: Dataset, lazy: bool) -> Self {
        Self {
            state: ViewState::new(dataset, lazy),
        }
    }

    pub(crate) fn from_state(state: ViewState) -> Self {
        Self { state }
    }

    /// The dataset of the view.
    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.state.dataset
    }

    /// The field path of the view, empty for the root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.state.path
    }

    /// Returns true if indexing returns views rather than values.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.state.lazy
    }

    /// Return views when indexing.
    pub fn enable_lazy(&mut self) {
        self.state.lazy = true;
    }

    /// Return values when indexing.
    pub fn disable_lazy(&mut self) {
        self.state.lazy = false;
    }

    /// The schema of the dictionary addressed by the view.
    ///
    /// # Errors
    /// Returns [`DatasetError::Deleted`] if the dataset has been deleted.
    pub fn schema(&self) -> Result<Schema, DatasetError> {
        let state = self.state.dataset.read_state()?;
        Ok(Self::dict_schema(&state, &self.state.path)?.clone())
    }

    fn dict_schema<'a>(state: &'a DatasetState, path: &str) -> Result<&'a Schema, DatasetError> {
        match state.meta.schema.node(path) {
            Some(SchemaNodeRef::Dict(schema)) => Ok(schema),
            _ => Err(DatasetError::Key(format!("'{path}' is not a dictionary of the dataset"))),
        }
    }

    /// Index the view, always returning a view.
    ///
    /// # Errors
    /// Returns [`DatasetError::Key`] if the field path does not exist, or an index error for an invalid index expression.
    pub fn view(&self, index: &[IndexItem]) -> Result<Item, DatasetError> {
        Ok(match self.state.child(index)? {
            Child::Dataset(state) => Item::Dataset(Self::from_state(state)),
            Child::Tensor(state) => Item::Tensor(TensorView::from_state(state)),
        })
    }

    /// Index the view.
    ///
    /// String items descend the schema, positional items select samples and, below a leaf, the axes of the leaf.
    /// In lazy mode the result is a view, in eager mode it is materialized.
    ///
    /// # Errors
    /// Returns [`DatasetError::Key`] for an unknown field path.
    /// In eager mode, returns any error of materializing the selection.
    pub fn get(&self, index: &[IndexItem]) -> Result<Item, DatasetError> {
        let item = self.view(index)?;
        if self.state.lazy {
            Ok(item)
        } else {
            item.compute().map(Item::Value)
        }
    }

    /// A view of the leaf at the relative `path`.
    ///
    /// # Errors
    /// Returns [`DatasetError::Key`] if `path` is not a leaf.
    pub fn tensor(&self, path: &str) -> Result<TensorView, DatasetError> {
        match self.state.child(&[IndexItem::Field(path.to_string())])? {
            Child::Tensor(state) => Ok(TensorView::from_state(state)),
            Child::Dataset(state) => Err(DatasetError::Key(format!(
                "'{}' is a dictionary, not a tensor",
                state.path
            ))),
        }
    }

    /// Assign `value` to the selection `index`.
    ///
    /// A dictionary selection takes a [`Value::Dict`] whose fields are assigned to the fields of the same name.
    ///
    /// # Errors
    /// - [`DatasetError::ReadMode`] in read mode.
    /// - [`DatasetError::Key`] for an unknown field.
    /// - [`DatasetError::ValueShape`] if `value` does not fit the selection.
    pub fn set(&self, index: &[IndexItem], value: impl Into<Value>) -> Result<(), DatasetError> {
        let value = value.into();
        match self.state.child(index)? {
            Child::Tensor(state) => TensorView::from_state(state).set(value),
            Child::Dataset(state) => Self::from_state(state).set_dict(&value),
        }
    }

    fn set_dict(&self, value: &Value) -> Result<(), DatasetError> {
        let Value::Dict(record) = value else {
            return Err(DatasetError::ValueShape(format!(
                "a {} cannot be assigned to the dictionary '{}', assign a dict",
                value.kind_name(),
                self.state.path
            )));
        };
        drop(self.state.dataset.writable_state()?);
        for (name, value) in record.iter() {
            match self.state.child(&[IndexItem::Field(name.to_string())])? {
                Child::Tensor(state) => TensorView::from_state(state).set(value.clone())?,
                Child::Dataset(state) => Self::from_state(state).set_dict(value)?,
            }
        }
        Ok(())
    }

    /// The number of visible samples, 1 for a single sample.
    ///
    /// # Errors
    /// Returns an error if the selection is invalid.
    pub fn len(&self) -> Result<u64, DatasetError> {
        self.state.dict_len()
    }

    /// Returns true if no samples are visible.
    ///
    /// # Errors
    /// Returns an error if the selection is invalid.
    pub fn is_empty(&self) -> Result<bool, DatasetError> {
        Ok(self.len()? == 0)
    }

    /// The visible samples.
    ///
    /// # Errors
    /// Returns an error if the selection is invalid.
    pub fn indexes(&self) -> Result<Indexes, DatasetError> {
        self.state.indexes(None)
    }

    /// Iterate over the visible samples.
    ///
    /// A view of a single sample yields itself.
    ///
    /// # Errors
    /// Returns an error if the selection is invalid.
    pub fn iter(&self) -> Result<impl Iterator<Item = Self> + '_, DatasetError> {
        let selection = {
            let state = self.state.dataset.read_state()?;
            self.state.resolve(&state, None)?
        };
        let count = match selection.samples {
            Samples::Single(_) => None,
            Samples::Many(samples) => Some(samples.len() as u64),
        };
        Ok(match count {
            None => itertools::Either::Left(std::iter::once(self.clone())),
            Some(count) => itertools::Either::Right(
                (0..count).map(|position| Self::from_state(self.state.indexed(position))),
            ),
        })
    }

    /// Materialize the view.
    ///
    /// A single sample materializes to a [`Value::Dict`] and several samples to a [`Value::List`] of them.
    ///
    /// # Errors
    /// Returns an error if the selection is invalid.
    pub fn compute(&self) -> Result<Value, DatasetError> {
        self.compute_opt(&ComputeOptions::default())
    }

    /// Materialize the view with `options`.
    ///
    /// # Errors
    /// Returns an error if the selection is invalid.
    pub fn compute_opt(&self, options: &ComputeOptions) -> Result<Value, DatasetError> {
        let state = self.state.dataset.read_state()?;
        let schema = Self::dict_schema(&state, &self.state.path)?;
        let selection = self.state.resolve(&state, None)?;
        match &selection.samples {
            Samples::Single(_) => {
                let mut records =
                    self.compute_records(&state, schema, &self.state.path, None, options)?;
                Ok(Value::Dict(records.pop().unwrap_or_default()))
            }
            Samples::Many(samples) => Ok(Value::List(
                self.compute_records(
                    &state,
                    schema,
                    &self.state.path,
                    Some(samples.len()),
                    options,
                )?
                .into_iter()
                .map(Value::Dict)
                .collect(),
            )),
        }
    }

    /// Materialize the fields of `schema`, a record per sample or a single record if `count` is [`None`].
    fn compute_records(
        &self,
        state: &DatasetState,
        schema: &Schema,
        path: &str,
        count: Option<usize>,
        options: &ComputeOptions,
    ) -> Result<Vec<Record>, DatasetError> {
        let mut records = vec![Record::new(); count.unwrap_or(1)];
        for (name, node) in schema.fields() {
            let field_path = join_path(path, name);
            let values = match node {
                SchemaNode::Leaf(_) => {
                    let view = TensorView::from_state(ViewState {
                        path: field_path,
                        ..self.state.clone()
                    });
                    let value = view.compute_with_state(state, options)?;
                    match count {
                        None => vec![value],
                        Some(count) => per_sample(value, count)?,
                    }
                }
                SchemaNode::Dict(schema) => self
                    .compute_records(state, schema, &field_path, count, options)?
                    .into_iter()
                    .map(Value::Dict)
                    .collect(),
            };
            for (record, value) in records.iter_mut().zip(values) {
                record.insert(name, value);
            }
        }
        Ok(records)
    }

    /// Keep the visible samples for which `predicate` holds.
    ///
    /// # Errors
    /// See [`filter`](crate::filter).
    pub fn filter(&self, predicate: &dyn crate::filter::Predicate) -> Result<Self, DatasetError> {
        crate::filter::filter(self, predicate)
    }

    /// A view with the same dataset and path over the ascending `samples`.
    pub(crate) fn with_samples(&self, samples: Vec<u64>) -> Self {
        Self::from_state(ViewState {
            base: SampleSet::List(samples),
            layers: Vec::new(),
            ..self.state.clone()
        })
    }
}

impl std::fmt::Display for DatasetView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schema = self.state.dataset.schema();
        let schema = schema
            .node(&self.state.path)
            .and_then(|node| match node {
                SchemaNodeRef::Dict(schema) => Some(schema.to_string()),
                SchemaNodeRef::Leaf(_) => None,
            })
            .unwrap_or_default();
        write!(
            f,
            "DatasetView(schema={schema}, url='{}', shape={}, mode='{}', path='/{}')",
            self.state.dataset.location_display(),
            format_max_shape(&[self.len().unwrap_or_default()]),
            self.state.dataset.mode(),
            self.state.path
        )
    }
}
