//! Datasets.
//!
//! A [`Dataset`] is a persisted collection of samples typed by a [`Schema`].
//! Each leaf of the schema is stored as a chunked tensor below `<dataset>/tensors/<leaf path>/`
//! and the dataset metadata is stored at `<dataset>/meta.json`.
//!
//! Chunks are written eagerly by every assignment, while the sample count and meta information are persisted by
//! [`Dataset::flush`], [`Dataset::save`] or [`Dataset::close`], and when the last handle is dropped.

mod builder;
mod meta;

use std::{collections::BTreeMap, sync::Arc};

use hub_storage::{
    ReadableWritableListableStorage, StorageError, StorePrefix, store_url::Token,
};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

pub use builder::{DatasetBuilder, DatasetShape};
pub(crate) use meta::{DatasetMeta, META_KEY};

use crate::{
    DatasetError,
    config::global_config,
    schema::{Schema, format_max_shape},
    slice::IndexItem,
    tensor::{ComputeOptions, Tensor},
    value::Value,
    view::{DatasetView, Item, TensorView},
};

/// The access mode of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Open an existing dataset, every mutation fails.
    #[serde(rename = "r")]
    Read,
    /// Open an existing dataset or create it if it does not exist.
    #[default]
    #[serde(rename = "a")]
    Append,
    /// Create the dataset, replacing any existing dataset at the location.
    #[serde(rename = "w")]
    Write,
}

impl Mode {
    /// The short name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Append => "a",
            Self::Write => "w",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutable state of a dataset.
#[derive(Debug)]
pub(crate) struct DatasetState {
    pub(crate) meta: DatasetMeta,
    pub(crate) tensors: BTreeMap<String, Tensor>,
    deleted: bool,
    dirty: bool,
}

impl DatasetState {
    pub(crate) fn len(&self) -> u64 {
        self.meta.shape[0]
    }

    /// The tensor of the leaf at the normalised `path`.
    pub(crate) fn tensor(&self, path: &str) -> Result<&Tensor, DatasetError> {
        self.tensors
            .get(path)
            .ok_or_else(|| DatasetError::Key(format!("'{path}' is not a tensor of the dataset")))
    }
}

pub(crate) struct DatasetInner {
    location: Option<String>,
    token: Token,
    mode: Mode,
    storage: ReadableWritableListableStorage,
    prefix: StorePrefix,
    state: RwLock<DatasetState>,
}

impl DatasetInner {
    fn write_meta(&self, meta: &DatasetMeta) -> Result<(), DatasetError> {
        let key = self.prefix.key(META_KEY).map_err(StorageError::from)?;
        self.storage.set(&key, meta.to_json()?.into())?;
        Ok(())
    }
}

impl Drop for DatasetInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.dirty && !state.deleted && self.mode != Mode::Read {
            let meta = state.meta.clone();
            if let Err(err) = self.write_meta(&meta) {
                log::warn!("failed to flush the dataset metadata on drop: {err}");
            }
        }
    }
}

/// A dataset handle.
///
/// Handles are cheap to clone and share the underlying dataset.
/// The lazy flag is local to a handle and inherited by the views created from it.
#[derive(Clone)]
pub struct Dataset {
    inner: Arc<DatasetInner>,
    lazy: bool,
}

fn tensor_prefix(prefix: &StorePrefix, path: &str) -> Result<StorePrefix, StorageError> {
    Ok(prefix.child("tensors")?.child(path)?)
}

impl Dataset {
    /// Create a [`DatasetBuilder`].
    #[must_use]
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::new()
    }

    /// Open an existing dataset at `location` in [`Mode::Append`].
    ///
    /// # Errors
    /// Returns [`DatasetError::CreateMode`] if there is no dataset at `location`, or any error opening it.
    pub fn open(location: &str) -> Result<Self, DatasetError> {
        DatasetBuilder::new().open(location)
    }

    pub(crate) fn from_parts(
        location: Option<String>,
        token: Token,
        mode: Mode,
        storage: ReadableWritableListableStorage,
        prefix: StorePrefix,
        meta: DatasetMeta,
        lazy: bool,
    ) -> Result<Self, DatasetError> {
        let len = meta.shape[0];
        let tensors = meta
            .schema
            .leaves()
            .into_iter()
            .map(|(path, spec)| {
                let tensor_prefix = tensor_prefix(&prefix, &path)?;
                let tensor = Tensor::new(storage.clone(), tensor_prefix, spec.clone(), len)?;
                Ok((path, tensor))
            })
            .collect::<Result<BTreeMap<_, _>, DatasetError>>()?;
        Ok(Self {
            inner: Arc::new(DatasetInner {
                location,
                token,
                mode,
                storage,
                prefix,
                state: RwLock::new(DatasetState {
                    meta,
                    tensors,
                    deleted: false,
                    dirty: false,
                }),
            }),
            lazy,
        })
    }

    /// Create a new dataset, persisting its metadata.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create(
        location: Option<String>,
        token: Token,
        mode: Mode,
        storage: ReadableWritableListableStorage,
        prefix: StorePrefix,
        schema: &Schema,
        shape: Vec<u64>,
        lazy: bool,
    ) -> Result<Self, DatasetError> {
        let schema = {
            let config = global_config();
            schema.resolved(config.default_compressor(), config.chunk_target_bytes())
        };
        let meta = DatasetMeta::new(schema, shape);
        let dataset = Self::from_parts(location, token, mode, storage, prefix, meta, lazy)?;
        dataset.inner.write_meta(&dataset.inner.state.read().meta)?;
        log::debug!("created dataset {dataset}");
        Ok(dataset)
    }

    pub(crate) fn read_state(&self) -> Result<RwLockReadGuard<'_, DatasetState>, DatasetError> {
        let state = self.inner.state.read();
        if state.deleted {
            Err(DatasetError::Deleted)
        } else {
            Ok(state)
        }
    }

    /// Acquire the state for a mutation.
    pub(crate) fn writable_state(&self) -> Result<RwLockReadGuard<'_, DatasetState>, DatasetError> {
        self.check_writable()?;
        self.read_state()
    }

    fn check_writable(&self) -> Result<(), DatasetError> {
        if self.inner.mode == Mode::Read {
            Err(DatasetError::ReadMode)
        } else {
            Ok(())
        }
    }

    fn update_meta(
        &self,
        update: impl FnOnce(&mut DatasetState) -> Result<(), DatasetError>,
    ) -> Result<(), DatasetError> {
        self.check_writable()?;
        let mut state = self.inner.state.write();
        if state.deleted {
            return Err(DatasetError::Deleted);
        }
        update(&mut state)?;
        state.dirty = true;
        Ok(())
    }

    /// The location the dataset was opened from, [`None`] for datasets opened with a storage.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.inner.location.as_deref()
    }

    pub(crate) fn token(&self) -> &Token {
        &self.inner.token
    }

    /// The access mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// The number of samples.
    ///
    /// After [`delete`](Dataset::delete) this is the last known number of samples.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.state.read().len()
    }

    /// Returns true if the dataset was erased by [`delete`](Dataset::delete).
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.inner.state.read().deleted
    }

    /// Returns true if the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shape of the dataset, `[len]`.
    ///
    /// After [`delete`](Dataset::delete) this is the last known shape.
    #[must_use]
    pub fn shape(&self) -> Vec<u64> {
        self.inner.state.read().meta.shape.clone()
    }

    /// The schema with resolved chunks and compressors.
    ///
    /// It is kept after [`delete`](Dataset::delete).
    #[must_use]
    pub fn schema(&self) -> Schema {
        self.inner.state.read().meta.schema.clone()
    }

    /// The display name, kept after [`delete`](Dataset::delete).
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.inner.state.read().meta.name.clone()
    }

    /// Change the display name and persist the metadata.
    ///
    /// # Errors
    /// Returns [`DatasetError::ReadMode`] in read mode, or an error persisting the metadata.
    pub fn rename(&self, name: impl Into<String>) -> Result<(), DatasetError> {
        let name = name.into();
        self.update_meta(|state| {
            state.meta.name = Some(name);
            Ok(())
        })?;
        self.flush()
    }

    /// The user meta information, kept after [`delete`](Dataset::delete).
    #[must_use]
    pub fn meta_information(&self) -> serde_json::Map<String, serde_json::Value> {
        self.inner.state.read().meta.meta_info.clone()
    }

    /// Replace the user meta information, persisted on the next flush.
    ///
    /// # Errors
    /// Returns [`DatasetError::ReadMode`] in read mode.
    pub fn set_meta_information(
        &self,
        meta_info: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), DatasetError> {
        self.update_meta(|state| {
            state.meta.meta_info = meta_info;
            Ok(())
        })
    }

    /// Returns true if indexing returns views rather than values.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Return views when indexing.
    pub fn enable_lazy(&mut self) {
        self.lazy = true;
    }

    /// Return values when indexing.
    pub fn disable_lazy(&mut self) {
        self.lazy = false;
    }

    /// A view of the whole dataset.
    #[must_use]
    pub fn view(&self) -> DatasetView {
        DatasetView::new(self.clone(), self.lazy)
    }

    /// Index the dataset.
    ///
    /// # Errors
    /// See [`DatasetView::get`].
    pub fn get(&self, index: &[IndexItem]) -> Result<Item, DatasetError> {
        self.view().get(index)
    }

    /// Assign `value` to the selection `index`.
    ///
    /// # Errors
    /// See [`DatasetView::set`].
    pub fn set(&self, index: &[IndexItem], value: impl Into<Value>) -> Result<(), DatasetError> {
        self.view().set(index, value)
    }

    /// A lazy view of the leaf tensor at `path`.
    ///
    /// # Errors
    /// Returns [`DatasetError::Key`] if `path` is not a leaf of the schema.
    pub fn tensor(&self, path: &str) -> Result<TensorView, DatasetError> {
        self.view().tensor(path)
    }

    /// Materialize every sample.
    ///
    /// # Errors
    /// See [`DatasetView::compute`].
    pub fn compute(&self) -> Result<Value, DatasetError> {
        self.view().compute()
    }

    /// Materialize every sample with `options`.
    ///
    /// # Errors
    /// See [`DatasetView::compute`].
    pub fn compute_opt(&self, options: &ComputeOptions) -> Result<Value, DatasetError> {
        self.view().compute_opt(options)
    }

    /// Add `count` samples, which read as zeros until written.
    ///
    /// # Errors
    /// Returns [`DatasetError::ReadMode`] in read mode, [`DatasetError::Value`] if the number of
    /// samples would overflow, or a storage error.
    pub fn append_shape(&self, count: u64) -> Result<(), DatasetError> {
        let len = self.len();
        let len = len.checked_add(count).ok_or_else(|| {
            DatasetError::Value(format!("cannot append {count} samples to {len} samples"))
        })?;
        self.resize_shape(len)
    }

    /// Set the number of samples.
    ///
    /// Shrinking erases the samples beyond `len`.
    ///
    /// # Errors
    /// Returns [`DatasetError::ReadMode`] in read mode or a storage error.
    pub fn resize_shape(&self, len: u64) -> Result<(), DatasetError> {
        self.update_meta(|state| {
            log::debug!("resizing dataset from {} to {len} samples", state.len());
            for tensor in state.tensors.values_mut() {
                tensor.resize(len)?;
            }
            state.meta.shape[0] = len;
            Ok(())
        })
    }

    /// Persist the metadata if it has changed.
    ///
    /// # Errors
    /// Returns a storage error if the metadata cannot be written.
    pub fn flush(&self) -> Result<(), DatasetError> {
        if self.inner.mode == Mode::Read {
            return Ok(());
        }
        let mut state = self.inner.state.write();
        if state.deleted {
            return Err(DatasetError::Deleted);
        }
        if state.dirty {
            self.inner.write_meta(&state.meta)?;
            state.dirty = false;
        }
        Ok(())
    }

    /// Checkpoint the metadata. An alias of [`flush`](Dataset::flush).
    ///
    /// # Errors
    /// See [`flush`](Dataset::flush).
    pub fn save(&self) -> Result<(), DatasetError> {
        self.flush()
    }

    /// Flush and release this handle.
    ///
    /// # Errors
    /// See [`flush`](Dataset::flush).
    pub fn close(self) -> Result<(), DatasetError> {
        self.flush()
    }

    /// Erase the dataset from its store.
    ///
    /// Every later operation on any handle of the dataset fails with [`DatasetError::Deleted`].
    /// The infallible accessors ([`len`](Dataset::len), [`shape`](Dataset::shape),
    /// [`schema`](Dataset::schema), [`name`](Dataset::name) and
    /// [`meta_information`](Dataset::meta_information)) keep returning the last known metadata.
    /// Use [`is_deleted`](Dataset::is_deleted) to tell them apart from a live dataset.
    ///
    /// # Errors
    /// Returns [`DatasetError::ReadMode`] in read mode or a storage error.
    pub fn delete(&self) -> Result<(), DatasetError> {
        self.check_writable()?;
        let mut state = self.inner.state.write();
        if state.deleted {
            return Err(DatasetError::Deleted);
        }
        for tensor in state.tensors.values() {
            tensor.erase()?;
        }
        self.inner.storage.erase_prefix(&self.inner.prefix)?;
        state.tensors.clear();
        state.deleted = true;
        log::debug!(
            "deleted dataset at {}",
            self.location().unwrap_or(self.inner.prefix.as_str())
        );
        Ok(())
    }

    /// Keep the samples for which `predicate` holds.
    ///
    /// # Errors
    /// See [`DatasetView::filter`].
    pub fn filter(
        &self,
        predicate: &dyn crate::filter::Predicate,
    ) -> Result<DatasetView, DatasetError> {
        self.view().filter(predicate)
    }

    /// Copy the dataset to a new dataset at `destination`.
    ///
    /// # Errors
    /// See [`DatasetView::copy`].
    pub fn copy(&self, destination: &str) -> Result<Self, DatasetError> {
        self.view().copy(destination)
    }

    /// Store the dataset at `destination`, replacing a compatible dataset.
    ///
    /// # Errors
    /// See [`DatasetView::store`].
    pub fn store(&self, destination: &str) -> Result<Self, DatasetError> {
        self.view().store(destination)
    }

    /// Map each sample to a sample of a dataset with `schema`, see [`DatasetView::transform`].
    pub fn transform<F>(&self, schema: Schema, function: F) -> crate::Transform<F>
    where
        F: FnMut(crate::Record) -> Result<crate::Record, DatasetError>,
    {
        self.view().transform(schema, function)
    }

    pub(crate) fn location_display(&self) -> String {
        self.location()
            .map_or_else(|| self.inner.prefix.to_string(), ToString::to_string)
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        write!(
            f,
            "Dataset(schema={}, url='{}', shape={}, mode='{}')",
            state.meta.schema,
            self.location_display(),
            format_max_shape(&state.meta.shape),
            self.inner.mode
        )
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
