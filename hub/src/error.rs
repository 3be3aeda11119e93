//! The dataset error type.

use hub_storage::{StorageError, store_url::StoreUrlError};
use itertools::Itertools;
use thiserror::Error;

use crate::{
    codec::CodecError,
    schema::{SchemaDiff, SchemaError},
    slice::{IndexError, IndexErrorKind},
    tensor_data::TensorDataError,
};

/// A dataset error.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The requested schema is incompatible with the persisted schema.
    #[error("schema mismatch: {}", .0.iter().join(", "))]
    SchemaMismatch(Vec<SchemaDiff>),
    /// The destination of a copy is not empty.
    #[error("the destination {0} is not empty")]
    DirectoryNotEmpty(String),
    /// A class label code or name is invalid.
    #[error("class label value error: {0}")]
    ClassLabelValue(String),
    /// A value does not fit the target region.
    #[error("value shape error: {0}")]
    ValueShape(String),
    /// A write was attempted on a dataset opened in read mode.
    #[error("the dataset is opened in read mode")]
    ReadMode,
    /// A field path does not exist.
    #[error("key error: {0}")]
    Key(String),
    /// An index is out of range.
    #[error(transparent)]
    Index(IndexError),
    /// An argument has an invalid type.
    #[error("type error: {0}")]
    Type(String),
    /// An argument has an invalid value.
    #[error("value error: {0}")]
    Value(String),
    /// A dataset cannot be created with the given mode or arguments.
    #[error("cannot create the dataset: {0}")]
    CreateMode(String),
    /// The dataset has been deleted.
    #[error("the dataset has been deleted")]
    Deleted,
    /// The dataset metadata is invalid.
    #[error("invalid dataset metadata: {0}")]
    Metadata(String),
    /// An invalid schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A store URL could not be resolved.
    #[error(transparent)]
    Location(#[from] StoreUrlError),
    /// A codec error.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A tensor data error.
    #[error(transparent)]
    TensorData(#[from] TensorDataError),
}

impl From<IndexError> for DatasetError {
    fn from(err: IndexError) -> Self {
        match err.kind() {
            IndexErrorKind::Type => Self::Type(err.to_string()),
            IndexErrorKind::Value => Self::Value(err.to_string()),
            IndexErrorKind::Index => Self::Index(err),
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Metadata(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_categories() {
        assert!(matches!(
            DatasetError::from(IndexError::InvalidType("5.3".to_string())),
            DatasetError::Type(_)
        ));
        assert!(matches!(
            DatasetError::from(IndexError::UnsupportedStep(-2)),
            DatasetError::Value(_)
        ));
        assert!(matches!(
            DatasetError::from(IndexError::MultipleEllipsis),
            DatasetError::Index(_)
        ));
    }

    #[test]
    fn schema_mismatch_display() {
        let err = DatasetError::SchemaMismatch(vec![
            SchemaDiff::Added("a".to_string()),
            SchemaDiff::Removed("b".to_string()),
        ]);
        assert_eq!(
            err.to_string(),
            "schema mismatch: field a was added, field b was removed"
        );
    }
}
