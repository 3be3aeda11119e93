//! Parser for store URLs.

use derive_more::Display;

use super::StoreUrlError;

/// A parsed store location.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{original}")]
pub struct StoreUrl {
    /// The URL scheme, `file` for bare paths.
    pub scheme: String,
    /// The authority (host or bucket), empty if absent.
    pub authority: String,
    /// The percent-decoded path.
    pub path: String,
    original: String,
}

impl StoreUrl {
    /// The location exactly as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.original
    }
}

/// Parse a store location.
///
/// Anything without a `scheme://` component is treated as a local filesystem path.
///
/// # Errors
/// Returns [`StoreUrlError::InvalidUrl`] if the location is empty or is not a valid URL.
pub fn parse_store_url(location: &str) -> Result<StoreUrl, StoreUrlError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(StoreUrlError::InvalidUrl("empty location".to_string()));
    }

    if !location.contains("://") {
        return Ok(StoreUrl {
            scheme: "file".to_string(),
            authority: String::new(),
            path: location.to_string(),
            original: location.to_string(),
        });
    }

    let url = url::Url::parse(location)?;
    let path = urlencoding::decode(url.path())
        .map_err(|err| StoreUrlError::InvalidUrl(err.to_string()))?
        .into_owned();
    Ok(StoreUrl {
        scheme: url.scheme().to_string(),
        authority: url.host_str().unwrap_or_default().to_string(),
        path,
        original: location.to_string(),
    })
}
