//! Resolution of dataset locations to stores.
//!
//! A location is either a URL with a scheme, such as `memory://name/path` or `s3://bucket/key`,
//! or a bare local path.
//! The scheme selects a store builder from the [global registry](get_global_registry), which
//! returns the store and the prefix within it that holds the dataset.
//! An optional [`Token`] is passed through verbatim to the builder; no credential validation is
//! performed here.
//!
//! Only the `memory` scheme is built in.
//! Its authority names a process-wide [`MemoryStore`](crate::store::MemoryStore), so reopening
//! `memory://name/path` reaches the same data.
//! Other stores register themselves with [`register_root_store`].
//!
//! # Examples
//!
//! ```rust
//! # use hub_storage::store_url::{resolve, Token};
//! let resolved = resolve("memory://scratch/datasets/mnist", &Token::new())?;
//! assert_eq!(resolved.prefix.as_str(), "datasets/mnist/");
//! # Ok::<(), hub_storage::store_url::StoreUrlError>(())
//! ```

mod parser;
mod registry;

pub use parser::{parse_store_url, StoreUrl};
pub use registry::{
    get_global_registry, register_root_store, resolve, ResolvedStore, RootStoreBuilder,
    StoreRegistry,
};

use std::collections::BTreeMap;

use crate::{StorageError, StoreKeyError, StorePrefixError};

/// An opaque credential object passed through to store builders.
pub type Token = BTreeMap<String, String>;

/// Error type for store URL operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreUrlError {
    /// Invalid URL syntax
    #[error("invalid URL syntax: {0}")]
    InvalidUrl(String),

    /// Unsupported URL scheme
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Store creation failed
    #[error("store creation failed: {0}")]
    StoreCreationFailed(String),

    /// Storage error
    #[error(transparent)]
    StorageError(#[from] StorageError),
}

impl From<url::ParseError> for StoreUrlError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<StoreKeyError> for StoreUrlError {
    fn from(err: StoreKeyError) -> Self {
        Self::StoreCreationFailed(err.to_string())
    }
}

impl From<StorePrefixError> for StoreUrlError {
    fn from(err: StorePrefixError) -> Self {
        Self::StoreCreationFailed(err.to_string())
    }
}
