use hub_storage::{
    ReadableWritableListableStorage, StorageError, StorePrefix, store_url::Token,
};

use super::{Dataset, DatasetMeta, META_KEY, Mode};
use crate::{DatasetError, config::global_config, schema::Schema};

/// The shape argument of a [`DatasetBuilder`].
///
/// Only one dimensional tuple shapes are supported, a bare integer is rejected when the dataset is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetShape {
    /// A bare integer.
    Scalar(u64),
    /// A tuple of axis lengths.
    Tuple(Vec<u64>),
}

impl From<u64> for DatasetShape {
    fn from(len: u64) -> Self {
        Self::Scalar(len)
    }
}

impl From<Vec<u64>> for DatasetShape {
    fn from(shape: Vec<u64>) -> Self {
        Self::Tuple(shape)
    }
}

impl From<&[u64]> for DatasetShape {
    fn from(shape: &[u64]) -> Self {
        Self::Tuple(shape.to_vec())
    }
}

impl<const N: usize> From<[u64; N]> for DatasetShape {
    fn from(shape: [u64; N]) -> Self {
        Self::Tuple(shape.to_vec())
    }
}

impl DatasetShape {
    fn validate(&self) -> Result<Vec<u64>, DatasetError> {
        match self {
            Self::Scalar(len) => Err(DatasetError::Type(format!(
                "the dataset shape must be a tuple, got the integer {len}"
            ))),
            Self::Tuple(shape) if shape.len() == 1 => Ok(shape.clone()),
            Self::Tuple(shape) => Err(DatasetError::Value(format!(
                "unsupported dataset shape {shape:?}, only one dimensional shapes are supported"
            ))),
        }
    }
}

/// A [`Dataset`] builder.
///
/// ```
/// # use hub::{Dataset, DataType, Mode, Schema, TensorSpec};
/// let schema = Schema::builder()
///     .field("image", TensorSpec::image(&[None, None, Some(3)], &[64, 64, 3]))
///     .field("label", DataType::Int64)
///     .build()?;
/// let dataset = Dataset::builder()
///     .schema(schema)
///     .shape([100])
///     .mode(Mode::Write)
///     .open("memory://doc/builder")?;
/// assert_eq!(dataset.len(), 100);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    schema: Option<Schema>,
    shape: Option<DatasetShape>,
    mode: Mode,
    name: Option<String>,
    meta_info: Option<serde_json::Map<String, serde_json::Value>>,
    token: Token,
    lazy: Option<bool>,
}

impl DatasetBuilder {
    /// Create a builder in [`Mode::Append`] without a schema or shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schema, required to create a dataset and checked against the persisted schema when opening one.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the shape, required to create a dataset.
    #[must_use]
    pub fn shape(mut self, shape: impl Into<DatasetShape>) -> Self {
        self.shape = Some(shape.into());
        self
    }

    /// Set the access mode.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the display name of a created dataset.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the meta information of a created dataset.
    #[must_use]
    pub fn meta_information(
        mut self,
        meta_info: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.meta_info = Some(meta_info);
        self
    }

    /// Set the token passed to the store of the location.
    #[must_use]
    pub fn token(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// Set whether indexing returns views (the default is [`Config::lazy_by_default`](crate::config::Config::lazy_by_default)).
    #[must_use]
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// Open or create the dataset at `location`.
    ///
    /// # Errors
    /// - [`DatasetError::Location`] if the location cannot be resolved.
    /// - [`DatasetError::CreateMode`] if the dataset does not exist and cannot be created with the given mode and arguments.
    /// - [`DatasetError::SchemaMismatch`] if the schema differs from the persisted schema.
    /// - [`DatasetError::Type`] or [`DatasetError::Value`] for an invalid shape.
    pub fn open(self, location: &str) -> Result<Dataset, DatasetError> {
        let resolved = crate::location::resolve_location(location, &self.token)?;
        self.open_impl(Some(location.to_string()), resolved.storage, resolved.prefix)
    }

    /// Open or create the dataset at `path` within `storage`.
    ///
    /// Datasets opened with a storage cannot be serialized.
    ///
    /// # Errors
    /// See [`open`](DatasetBuilder::open).
    pub fn open_with_storage(
        self,
        storage: ReadableWritableListableStorage,
        path: &str,
    ) -> Result<Dataset, DatasetError> {
        let prefix = StorePrefix::from_path(path).map_err(StorageError::from)?;
        self.open_impl(None, storage, prefix)
    }

    fn open_impl(
        self,
        location: Option<String>,
        storage: ReadableWritableListableStorage,
        prefix: StorePrefix,
    ) -> Result<Dataset, DatasetError> {
        let lazy = self
            .lazy
            .unwrap_or_else(|| global_config().lazy_by_default());
        let shape = self.shape.as_ref().map(DatasetShape::validate).transpose()?;
        let meta_key = prefix.key(META_KEY).map_err(StorageError::from)?;
        let display = location.clone().unwrap_or_else(|| prefix.to_string());

        let existing = match self.mode {
            Mode::Write => None,
            Mode::Read | Mode::Append => storage.get(&meta_key)?,
        };
        if let Some(bytes) = existing {
            let meta = DatasetMeta::from_json(&bytes)?;
            if let Some(schema) = &self.schema {
                let diffs = meta.schema.diff(schema);
                if !diffs.is_empty() {
                    return Err(DatasetError::SchemaMismatch(diffs));
                }
            }
            log::debug!("opening dataset at {display} in mode '{}'", self.mode);
            return Dataset::from_parts(
                location, self.token, self.mode, storage, prefix, meta, lazy,
            );
        }

        if self.mode == Mode::Read {
            return Err(DatasetError::CreateMode(format!(
                "there is no dataset at {display} to open in read mode"
            )));
        }
        let (Some(schema), Some(shape)) = (&self.schema, shape) else {
            return Err(DatasetError::CreateMode(format!(
                "there is no dataset at {display}, a schema and a shape are required to create one"
            )));
        };
        if self.mode == Mode::Write {
            storage.erase_prefix(&prefix)?;
        }
        let dataset = Dataset::create(
            location,
            self.token.clone(),
            self.mode,
            storage,
            prefix,
            schema,
            shape,
            lazy,
        )?;
        if self.name.is_some() || self.meta_info.is_some() {
            dataset.update_meta(|state| {
                state.meta.name.clone_from(&self.name);
                state.meta.meta_info = self.meta_info.unwrap_or_default();
                Ok(())
            })?;
            dataset.flush()?;
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hub_storage::store::MemoryStore;

    use super::*;
    use crate::{data_type::DataType, schema::TensorSpec};

    fn schema() -> Schema {
        Schema::builder().field("a", DataType::Float32).build().unwrap()
    }

    #[test]
    fn dataset_builder_modes() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            DatasetBuilder::new().mode(Mode::Read).open_with_storage(store.clone(), ""),
            Err(DatasetError::CreateMode(_))
        ));
        assert!(matches!(
            DatasetBuilder::new().open_with_storage(store.clone(), ""),
            Err(DatasetError::CreateMode(_))
        ));
        assert!(matches!(
            DatasetBuilder::new()
                .schema(schema())
                .mode(Mode::Write)
                .open_with_storage(store.clone(), ""),
            Err(DatasetError::CreateMode(_))
        ));
        let dataset = DatasetBuilder::new()
            .schema(schema())
            .shape([4])
            .name("first")
            .open_with_storage(store.clone(), "")
            .unwrap();
        assert_eq!(dataset.name().as_deref(), Some("first"));
        let read = DatasetBuilder::new()
            .mode(Mode::Read)
            .open_with_storage(store.clone(), "")
            .unwrap();
        assert_eq!(read.len(), 4);
        assert_eq!(read.name().as_deref(), Some("first"));

        let dataset = DatasetBuilder::new()
            .schema(schema())
            .shape([2])
            .mode(Mode::Write)
            .open_with_storage(store, "")
            .unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.name(), None);
    }

    #[test]
    fn dataset_builder_shape() {
        let store = Arc::new(MemoryStore::new());
        let builder = DatasetBuilder::new().schema(schema());
        assert!(matches!(
            builder.clone().shape(5u64).open_with_storage(store.clone(), ""),
            Err(DatasetError::Type(_))
        ));
        assert!(matches!(
            builder.clone().shape([5, 2]).open_with_storage(store.clone(), ""),
            Err(DatasetError::Value(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn dataset_builder_schema_mismatch() {
        let store = Arc::new(MemoryStore::new());
        DatasetBuilder::new()
            .schema(schema())
            .shape([4])
            .open_with_storage(store.clone(), "")
            .unwrap();
        let other = Schema::builder()
            .field("a", TensorSpec::new(&[2]).with_data_type(DataType::Float32))
            .build()
            .unwrap();
        assert!(matches!(
            DatasetBuilder::new().schema(other).open_with_storage(store.clone(), ""),
            Err(DatasetError::SchemaMismatch(_))
        ));
        assert!(DatasetBuilder::new().schema(schema()).open_with_storage(store, "").is_ok());
    }
}
