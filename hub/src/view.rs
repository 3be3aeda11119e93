//! Lazy and eager views of datasets.
//!
//! A view is a dataset handle, a field path, the set of visible samples and the layers of positional selectors applied by successive indexing.
//! Layers are kept unresolved and composed against the bounds of the addressed leaf when the view is materialized,
//! so `view.get(a)?.get(b)` is equivalent to a single `get` with the selectors of both.
//!
//! In lazy mode indexing returns views, in eager mode it returns the materialized [`Value`].

mod dataset_view;
mod descriptor;
mod tensor_view;

use serde::{Deserialize, Serialize};

pub use dataset_view::DatasetView;
pub use tensor_view::TensorView;

use crate::{
    Dataset, DatasetError,
    dataset::DatasetState,
    schema::{SchemaNodeRef, TensorSpec, join_path},
    slice::{AxisBound, AxisState, IndexError, IndexItem, Selector, compose, split},
    tensor::ComputeOptions,
    value::Value,
};

/// The result of indexing a view.
#[derive(Debug, Clone)]
pub enum Item {
    /// A view of a dictionary node.
    Dataset(DatasetView),
    /// A view of a leaf.
    Tensor(TensorView),
    /// A materialized value.
    Value(Value),
}

impl Item {
    /// Materialize the item.
    ///
    /// # Errors
    /// Returns an error if the selection of a view is invalid.
    pub fn compute(&self) -> Result<Value, DatasetError> {
        self.compute_opt(&ComputeOptions::default())
    }

    /// Materialize the item with `options`.
    ///
    /// # Errors
    /// Returns an error if the selection of a view is invalid.
    pub fn compute_opt(&self, options: &ComputeOptions) -> Result<Value, DatasetError> {
        match self {
            Self::Dataset(view) => view.compute_opt(options),
            Self::Tensor(view) => view.compute_opt(options),
            Self::Value(value) => Ok(value.clone()),
        }
    }

    /// Returns the value if the item is materialized.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        if let Self::Value(value) = self { Some(value) } else { None }
    }

    /// Returns the tensor view.
    #[must_use]
    pub fn into_tensor(self) -> Option<TensorView> {
        if let Self::Tensor(view) = self { Some(view) } else { None }
    }

    /// Returns the dataset view.
    #[must_use]
    pub fn into_dataset(self) -> Option<DatasetView> {
        if let Self::Dataset(view) = self { Some(view) } else { None }
    }
}

/// The shape of a tensor view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewShape {
    /// The shape of the selection.
    Fixed(Vec<u64>),
    /// The shape of the selection of each sample, when samples of a dynamic leaf differ.
    PerSample(Vec<Vec<u64>>),
}

impl ViewShape {
    /// Returns the fixed shape.
    #[must_use]
    pub fn as_fixed(&self) -> Option<&[u64]> {
        if let Self::Fixed(shape) = self { Some(shape) } else { None }
    }
}

/// The samples visible through a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indexes {
    /// A single sample.
    Single(u64),
    /// Ascending samples.
    List(Vec<u64>),
}

/// The samples a view is based on, before its layers are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum SampleSet {
    /// Every sample of the dataset.
    All,
    /// Ascending samples selected by a filter.
    List(Vec<u64>),
}

/// The samples of a resolved selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Samples {
    Single(u64),
    Many(Vec<u64>),
}

/// A selection resolved against the current dataset state.
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    pub(crate) samples: Samples,
    /// The state of each inner axis of a leaf, empty for a dictionary.
    pub(crate) axes: Vec<AxisState>,
}

impl Selection {
    pub(crate) fn inner(&self) -> Vec<Selector> {
        self.axes.iter().map(AxisState::to_selector).collect()
    }
}

/// The state shared by [`DatasetView`] and [`TensorView`].
#[derive(Debug, Clone)]
pub(crate) struct ViewState {
    pub(crate) dataset: Dataset,
    pub(crate) path: String,
    pub(crate) base: SampleSet,
    pub(crate) layers: Vec<Vec<Selector>>,
    pub(crate) lazy: bool,
}

/// A view state addressing a child node.
pub(crate) enum Child {
    Dataset(ViewState),
    Tensor(ViewState),
}

impl ViewState {
    pub(crate) fn new(dataset: Dataset, lazy: bool) -> Self {
        Self {
            dataset,
            path: String::new(),
            base: SampleSet::All,
            layers: Vec::new(),
            lazy,
        }
    }

    /// The state of the node at the relative `index`.
    pub(crate) fn child(&self, index: &[IndexItem]) -> Result<Child, DatasetError> {
        let (selectors, path) = split(index)?;
        let path = join_path(&self.path, &path);
        let mut layers = self.layers.clone();
        if !selectors.is_empty() {
            layers.push(selectors);
        }
        let is_leaf = {
            let state = self.dataset.read_state()?;
            match state.meta.schema.node(&path) {
                Some(SchemaNodeRef::Leaf(_)) => true,
                Some(SchemaNodeRef::Dict(_)) => false,
                None => {
                    return Err(DatasetError::Key(format!(
                        "'{path}' is not a field of the dataset"
                    )));
                }
            }
        };
        let state = Self {
            dataset: self.dataset.clone(),
            path,
            base: self.base.clone(),
            layers,
            lazy: self.lazy,
        };
        Ok(if is_leaf {
            Child::Tensor(state)
        } else {
            Child::Dataset(state)
        })
    }

    /// The state with an additional layer fixing the first free axis at `index`.
    pub(crate) fn indexed(&self, index: u64) -> Self {
        let mut state = self.clone();
        state
            .layers
            .push(vec![Selector::Index(i64::try_from(index).unwrap_or(i64::MAX))]);
        state
    }

    fn base_len(&self, state: &DatasetState) -> u64 {
        match &self.base {
            SampleSet::All => state.len(),
            SampleSet::List(samples) => samples.len() as u64,
        }
    }

    fn base_sample(&self, position: u64) -> u64 {
        match &self.base {
            SampleSet::All => position,
            SampleSet::List(samples) => samples
                .get(crate::tensor_data::usize_from(position))
                .copied()
                .unwrap_or(position),
        }
    }

    /// Resolve the layers against the bounds of the dataset and of the leaf `spec`.
    pub(crate) fn resolve(
        &self,
        state: &DatasetState,
        spec: Option<&TensorSpec>,
    ) -> Result<Selection, DatasetError> {
        let mut bounds = vec![AxisBound::fixed(self.base_len(state))];
        if let Some(spec) = spec {
            bounds.extend(spec.shape().iter().zip(spec.max_shape()).map(
                |(size, &max_size)| match size {
                    Some(size) => AxisBound::fixed(*size),
                    None => AxisBound::dynamic(max_size),
                },
            ));
        }
        let mut axes = compose(&self.layers, &bounds).map_err(|err| match err {
            IndexError::TooManyIndices { given, .. } if spec.is_none() => {
                DatasetError::Value(format!(
                    "a dictionary can only be indexed along the sample axis, \
                     got {given} positional indices"
                ))
            }
            err => err.into(),
        })?;
        let samples = match axes.remove(0) {
            AxisState::Index(position) => Samples::Single(self.base_sample(position)),
            AxisState::Span { start, stop, .. } => Samples::Many(match &self.base {
                SampleSet::All => (start..stop).collect(),
                SampleSet::List(samples) => samples
                    [crate::tensor_data::usize_from(start)..crate::tensor_data::usize_from(stop)]
                    .to_vec(),
            }),
        };
        Ok(Selection { samples, axes })
    }

    /// The size of the first free axis of a dictionary, 1 if every axis is fixed.
    pub(crate) fn dict_len(&self) -> Result<u64, DatasetError> {
        let state = self.dataset.read_state()?;
        let selection = self.resolve(&state, None)?;
        Ok(match selection.samples {
            Samples::Single(_) => 1,
            Samples::Many(samples) => samples.len() as u64,
        })
    }

    pub(crate) fn indexes(&self, spec_path: Option<&str>) -> Result<Indexes, DatasetError> {
        let state = self.dataset.read_state()?;
        let spec = spec_path
            .map(|path| state.tensor(path).map(|tensor| tensor.spec().clone()))
            .transpose()?;
        Ok(match self.resolve(&state, spec.as_ref())?.samples {
            Samples::Single(sample) => Indexes::Single(sample),
            Samples::Many(samples) => Indexes::List(samples),
        })
    }
}
