//! Store registry for store URLs.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use super::{parse_store_url, StoreUrl, StoreUrlError, Token};
use crate::{store::MemoryStore, ReadableWritableListableStorage, StorePrefix};

/// A store and the prefix within it addressed by a location.
#[derive(Clone)]
pub struct ResolvedStore {
    /// The store.
    pub storage: ReadableWritableListableStorage,
    /// The prefix of the location within the store.
    pub prefix: StorePrefix,
}

impl std::fmt::Debug for ResolvedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// A function that creates a store from a parsed location and a token.
pub type RootStoreBuilder =
    Arc<dyn Fn(&StoreUrl, &Token) -> Result<ResolvedStore, StoreUrlError> + Send + Sync>;

/// Registry for store builders.
pub struct StoreRegistry {
    root_builders: RwLock<HashMap<String, RootStoreBuilder>>,
    memory_stores: Arc<Mutex<HashMap<String, Arc<MemoryStore>>>>,
}

fn named_memory_store(
    stores: &Mutex<HashMap<String, Arc<MemoryStore>>>,
    name: &str,
) -> Arc<MemoryStore> {
    stores.lock().entry(name.to_string()).or_default().clone()
}

impl StoreRegistry {
    /// Create a new registry with the built-in `memory` scheme.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            root_builders: RwLock::new(HashMap::new()),
            memory_stores: Arc::default(),
        };
        let memory_stores = registry.memory_stores.clone();
        registry.register_root_store("memory", move |url, _token| {
            Ok(ResolvedStore {
                storage: named_memory_store(&memory_stores, &url.authority),
                prefix: StorePrefix::from_path(&url.path)?,
            })
        });
        registry
    }

    /// Register a root store builder for `scheme`, replacing any existing builder.
    pub fn register_root_store<F>(&self, scheme: &str, builder: F)
    where
        F: Fn(&StoreUrl, &Token) -> Result<ResolvedStore, StoreUrlError> + Send + Sync + 'static,
    {
        self.root_builders
            .write()
            .insert(scheme.to_string(), Arc::new(builder));
    }

    /// Get a root store builder.
    #[must_use]
    pub fn get_root_builder(&self, scheme: &str) -> Option<RootStoreBuilder> {
        self.root_builders.read().get(scheme).cloned()
    }

    /// Returns true if a builder is registered for `scheme`.
    #[must_use]
    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.root_builders.read().contains_key(scheme)
    }

    /// Get the named in-memory store, creating it if it does not exist.
    #[must_use]
    pub fn memory_store(&self, name: &str) -> Arc<MemoryStore> {
        named_memory_store(&self.memory_stores, name)
    }

    /// Resolve a location with this registry.
    ///
    /// # Errors
    /// Returns [`StoreUrlError::UnsupportedScheme`] if no builder is registered for the scheme,
    /// or any error from parsing the location or running the builder.
    pub fn resolve(&self, location: &str, token: &Token) -> Result<ResolvedStore, StoreUrlError> {
        let url = parse_store_url(location)?;
        let builder = self.get_root_builder(&url.scheme).ok_or_else(|| {
            StoreUrlError::UnsupportedScheme(format!(
                "no store registered for scheme '{}'",
                url.scheme
            ))
        })?;
        builder(&url, token)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the global store registry.
#[must_use]
pub fn get_global_registry() -> &'static StoreRegistry {
    static REGISTRY: OnceLock<StoreRegistry> = OnceLock::new();
    REGISTRY.get_or_init(StoreRegistry::new)
}

/// Register a root store builder in the global registry.
///
/// This function is used by store implementations to register themselves.
pub fn register_root_store<F>(scheme: &str, builder: F)
where
    F: Fn(&StoreUrl, &Token) -> Result<ResolvedStore, StoreUrlError> + Send + Sync + 'static,
{
    get_global_registry().register_root_store(scheme, builder);
}

/// Resolve a location with the global registry.
///
/// # Errors
/// See [`StoreRegistry::resolve`].
pub fn resolve(location: &str, token: &Token) -> Result<ResolvedStore, StoreUrlError> {
    get_global_registry().resolve(location, token)
}
