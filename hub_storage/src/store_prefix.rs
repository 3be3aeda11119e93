use derive_more::Display;
use thiserror::Error;

use crate::StoreKey;

/// A prefix of keys in a store.
///
/// A valid prefix is either empty (the root) or a `/` delimited string ending with `/` that does not start with `/`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Debug, Clone, Error)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate()`].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// Create a new store prefix from `prefix` without validation.
    ///
    /// # Safety
    /// `prefix` is not validated, so this can result in an invalid store prefix.
    #[must_use]
    pub unsafe fn new_unchecked(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug_assert!(Self::validate(&prefix));
        Self(prefix)
    }

    /// The root prefix.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Create a prefix from `/` delimited path segments, ignoring empty segments.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if the joined segments do not form a valid prefix.
    pub fn from_path(path: &str) -> Result<Self, StorePrefixError> {
        let joined: String = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.to_string() + "/")
            .collect();
        Self::new(joined)
    }

    /// Extracts a string slice of the underlying prefix [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns true if this is the root prefix.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Validates a prefix.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || (prefix.ends_with('/') && !prefix.starts_with('/') && !prefix.contains("//"))
    }

    /// Returns a key formed by appending `suffix` to this prefix.
    ///
    /// # Errors
    /// Returns a [`StoreKeyError`](crate::StoreKeyError) if the result is not a valid key.
    pub fn key(&self, suffix: &str) -> Result<StoreKey, crate::StoreKeyError> {
        StoreKey::new(self.0.clone() + suffix)
    }

    /// Returns a child prefix formed by appending `suffix` to this prefix.
    ///
    /// # Errors
    /// Returns a [`StorePrefixError`] if the result is not a valid prefix.
    pub fn child(&self, suffix: &str) -> Result<Self, StorePrefixError> {
        let suffix = suffix.trim_matches('/');
        if suffix.is_empty() {
            return Ok(self.clone());
        }
        Self::new(self.0.clone() + suffix + "/")
    }

    /// Returns the parent of this prefix, or [`None`] for the root prefix.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.0.strip_suffix('/')?;
        let parent = trimmed
            .rsplit_once('/')
            .map_or(String::new(), |(parent, _)| parent.to_string() + "/");
        Some(Self(parent))
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}
