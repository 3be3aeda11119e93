use derive_more::Display;
use thiserror::Error;

use crate::StorePrefix;

/// A key in a store.
///
/// A valid key is a non-empty `/` delimited string that does not start or end with `/`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct StoreKey(String);

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

/// An invalid store key.
#[derive(Debug, Clone, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Create a new store key from `key` without validation.
    ///
    /// # Safety
    /// `key` is not validated, so this can result in an invalid store key.
    #[must_use]
    pub unsafe fn new_unchecked(key: impl Into<String>) -> Self {
        let key = key.into();
        debug_assert!(Self::validate(&key));
        Self(key)
    }

    /// Extracts a string slice of the underlying key [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Validates a key.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty() && !key.starts_with('/') && !key.ends_with('/') && !key.contains("//")
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }

    /// Returns the key relative to `prefix`, or [`None`] if the key is not under `prefix`.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &StorePrefix) -> Option<&str> {
        self.0.strip_prefix(prefix.as_str())
    }

    /// Returns the name of the key (the final path component).
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Returns the parent of this key.
    #[must_use]
    pub fn parent(&self) -> StorePrefix {
        let parent = self
            .0
            .rsplit_once('/')
            .map_or(String::new(), |(parent, _)| parent.to_string() + "/");
        // SAFETY: the parent of a valid key is empty or ends with "/" and does not start with "/"
        unsafe { StorePrefix::new_unchecked(parent) }
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

impl TryFrom<String> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}
