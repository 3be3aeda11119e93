//! Resolution of dataset locations.

use hub_storage::store_url::{ResolvedStore, Token};

use crate::DatasetError;

/// Resolve `location` to a store and the prefix of the dataset within it.
///
/// With the `filesystem` feature, `file://` locations and bare paths resolve to a filesystem store.
pub(crate) fn resolve_location(
    location: &str,
    token: &Token,
) -> Result<ResolvedStore, DatasetError> {
    #[cfg(feature = "filesystem")]
    hub_filesystem::register_store_url();
    log::debug!("resolving dataset location {location}");
    Ok(hub_storage::store_url::resolve(location, token)?)
}
