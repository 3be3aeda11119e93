use super::{Indexes, Samples, Selection, ViewShape, ViewState};
use crate::{
    Dataset, DatasetError,
    dataset::DatasetState,
    schema::TensorSpec,
    slice::{AxisState, IndexItem},
    tensor::{ComputeOptions, Tensor},
    value::Value,
};

/// A view of a leaf tensor of a dataset.
#[derive(Debug, Clone)]
pub struct TensorView {
    pub(crate) state: ViewState,
}

impl TensorView {
    pub(crate) fn from_state(state: ViewState) -> Self {
        Self { state }
    }

    /// The dataset of the view.
    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.state.dataset
    }

    /// The path of the leaf.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.state.path
    }

    /// The specification of the leaf.
    ///
    /// # Errors
    /// Returns [`DatasetError::Deleted`] if the dataset has been deleted.
    pub fn spec(&self) -> Result<TensorSpec, DatasetError> {
        let state = self.state.dataset.read_state()?;
        Ok(state.tensor(&self.state.path)?.spec().clone())
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

    fn with_tensor<R>(
        &self,
        state: &DatasetState,
        f: impl FnOnce(&Tensor, Selection) -> Result<R, DatasetError>,
    ) -> Result<R, DatasetError> {
        let tensor = state.tensor(&self.state.path)?;
        let selection = self.state.resolve(state, Some(tensor.spec()))?;
        f(tensor, selection)
    }

    /// Index the view, always returning a view.
    ///
    /// # Errors
    /// Returns [`DatasetError::Key`] if `index` has a field name, or an index error for an invalid index expression.
    pub fn view(&self, index: &[IndexItem]) -> Result<Self, DatasetError> {
        if index.iter().any(|item| matches!(item, IndexItem::Field(_))) {
            return Err(DatasetError::Key(format!(
                "'{}' is a tensor and has no fields",
                self.state.path
            )));
        }
        match self.state.child(index)? {
            super::Child::Tensor(state) => Ok(Self::from_state(state)),
            super::Child::Dataset(state) => Err(DatasetError::Key(format!(
                "'{}' is not a tensor",
                state.path
            ))),
        }
    }

    /// Index the view.
    ///
    /// In lazy mode the result is a view, in eager mode it is materialized.
    ///
    /// # Errors
    /// See [`view`](TensorView::view). In eager mode, returns any error of materializing the selection.
    pub fn get(&self, index: &[IndexItem]) -> Result<super::Item, DatasetError> {
        let view = self.view(index)?;
        if self.state.lazy {
            Ok(super::Item::Tensor(view))
        } else {
            view.compute().map(super::Item::Value)
        }
    }

    /// Materialize the view.
    ///
    /// A selection of several samples of a dynamic, text or named class label leaf materializes to a
    /// [`Value::List`] with a value per sample, other selections to a single value.
    ///
    /// # Errors
    /// Returns an index error if the selection is out of bounds for the leaf.
    pub fn compute(&self) -> Result<Value, DatasetError> {
        self.compute_opt(&ComputeOptions::default())
    }

    /// Materialize the view with `options`.
    ///
    /// # Errors
    /// See [`compute`](TensorView::compute).
    pub fn compute_opt(&self, options: &ComputeOptions) -> Result<Value, DatasetError> {
        let state = self.state.dataset.read_state()?;
        self.compute_with_state(&state, options)
    }

    pub(crate) fn compute_with_state(
        &self,
        state: &DatasetState,
        options: &ComputeOptions,
    ) -> Result<Value, DatasetError> {
        self.with_tensor(state, |tensor, selection| {
            let inner = selection.inner();
            match &selection.samples {
                Samples::Single(sample) => tensor.read_sample(*sample, &inner, *options),
                Samples::Many(samples) => tensor.read_samples(samples, &inner, *options),
            }
        })
    }

    /// Materialize the view as an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// Returns [`DatasetError::Type`] if the view does not materialize to a single array, e.g. selections of several
    /// samples of a dynamic leaf.
    #[cfg(feature = "ndarray")]
    pub fn ndarray<T: crate::data_type::Element>(
        &self,
    ) -> Result<ndarray::ArrayD<T>, DatasetError> {
        match self.compute()? {
            Value::Array(data) => Ok(data.to_ndarray()?),
            value => Err(DatasetError::Type(format!(
                "'{}' materializes to a {}, not an array",
                self.state.path,
                value.kind_name()
            ))),
        }
    }

    /// Assign `value` to the selection.
    ///
    /// # Errors
    /// - [`DatasetError::ReadMode`] in read mode.
    /// - [`DatasetError::ValueShape`] if `value` does not fit the selection.
    /// - [`DatasetError::ClassLabelValue`] for an invalid class label code or name.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), DatasetError> {
        let value = value.into();
        let state = self.state.dataset.writable_state()?;
        self.with_tensor(&state, |tensor, selection| {
            let inner = selection.inner();
            match &selection.samples {
                Samples::Single(sample) => tensor.write_sample(*sample, &inner, &value),
                Samples::Many(samples) => tensor.write_samples(samples, &inner, &value),
            }
        })
    }

    /// The shape of the selection of `sample`, implicit dynamic axes taking the extent of the sample.
    fn sample_shape(
        tensor: &Tensor,
        selection: &Selection,
        sample: u64,
    ) -> Result<Vec<u64>, DatasetError> {
        let dynamic = tensor.spec().shape().iter().map(Option::is_none).collect::<Vec<_>>();
        let actual = if tensor.spec().is_dynamic() {
            Some(tensor.sample_shape(sample)?)
        } else {
            None
        };
        Ok(selection
            .axes
            .iter()
            .enumerate()
            .filter_map(|(axis, state)| match *state {
                AxisState::Index(_) => None,
                AxisState::Span { implicit: true, .. } if dynamic[axis] => {
                    actual.as_ref().map(|actual| actual[axis])
                }
                AxisState::Span { start, stop, .. } => Some(stop - start),
            })
            .collect())
    }

    /// The shape of the selection.
    ///
    /// For a selection of several samples the leading axis is the number of samples.
    /// It is [`ViewShape::PerSample`] if the selected samples of a dynamic leaf have different shapes.
    ///
    /// # Errors
    /// Returns an index error if the selection is out of bounds for the leaf.
    pub fn shape(&self) -> Result<ViewShape, DatasetError> {
        let state = self.state.dataset.read_state()?;
        self.with_tensor(&state, |tensor, selection| match &selection.samples {
            Samples::Single(sample) => Ok(ViewShape::Fixed(Self::sample_shape(
                tensor, &selection, *sample,
            )?)),
            Samples::Many(samples) => {
                let shapes = samples
                    .iter()
                    .map(|&sample| Self::sample_shape(tensor, &selection, sample))
                    .collect::<Result<Vec<_>, _>>()?;
                let first = match shapes.first() {
                    Some(first) => first.clone(),
                    None => Self::sample_shape_static(tensor, &selection),
                };
                if shapes.iter().all(|shape| *shape == first) {
                    let mut shape = vec![samples.len() as u64];
                    shape.extend(first);
                    Ok(ViewShape::Fixed(shape))
                } else {
                    Ok(ViewShape::PerSample(shapes))
                }
            }
        })
    }

    /// The shape of the selection of a sample without stored extents.
    fn sample_shape_static(tensor: &Tensor, selection: &Selection) -> Vec<u64> {
        let dynamic = tensor.spec().shape().iter().map(Option::is_none).collect::<Vec<_>>();
        selection
            .axes
            .iter()
            .enumerate()
            .filter_map(|(axis, state)| match *state {
                AxisState::Index(_) => None,
                AxisState::Span { implicit: true, .. } if dynamic[axis] => Some(0),
                AxisState::Span { start, stop, .. } => Some(stop - start),
            })
            .collect()
    }

    /// The size of the first free axis of the selection.
    ///
    /// # Errors
    /// Returns [`DatasetError::Type`] if every axis of the selection is fixed.
    pub fn len(&self) -> Result<u64, DatasetError> {
        let state = self.state.dataset.read_state()?;
        self.with_tensor(&state, |tensor, selection| match &selection.samples {
            Samples::Many(samples) => Ok(samples.len() as u64),
            Samples::Single(sample) => Self::sample_shape(tensor, &selection, *sample)?
                .first()
                .copied()
                .ok_or_else(|| {
                    DatasetError::Type(format!(
                        "the selection of '{}' is a single element and has no length",
                        self.state.path
                    ))
                }),
        })
    }

    /// Returns true if the first free axis of the selection is empty.
    ///
    /// # Errors
    /// See [`len`](TensorView::len).
    pub fn is_empty(&self) -> Result<bool, DatasetError> {
        Ok(self.len()? == 0)
    }

    /// The visible samples.
    ///
    /// # Errors
    /// Returns an index error if the selection is out of bounds for the leaf.
    pub fn indexes(&self) -> Result<Indexes, DatasetError> {
        self.state.indexes(Some(&self.state.path))
    }

    /// Iterate over the first free axis of the selection.
    ///
    /// # Errors
    /// See [`len`](TensorView::len).
    pub fn iter(&self) -> Result<impl Iterator<Item = Self> + '_, DatasetError> {
        let len = self.len()?;
        Ok((0..len).map(|index| Self::from_state(self.state.indexed(index))))
    }
}

impl std::fmt::Display for TensorView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let spec = self
            .spec()
            .map(|spec| spec.to_string())
            .unwrap_or_default();
        let shape = match self.shape() {
            Ok(ViewShape::Fixed(shape)) => crate::schema::format_max_shape(&shape),
            Ok(ViewShape::PerSample(_)) => "(ragged)".to_string(),
            Err(_) => "()".to_string(),
        };
        write!(
            f,
            "TensorView(dtype='{}', path='/{}', shape={shape}, spec={spec})",
            self.spec().map(|spec| spec.data_type().to_string()).unwrap_or_default(),
            self.state.path
        )
    }
}
