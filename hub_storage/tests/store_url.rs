#![allow(missing_docs)]

use std::{error::Error, sync::Arc};

use hub_storage::{
    store::MemoryStore,
    store_url::{register_root_store, resolve, ResolvedStore, StoreUrlError, Token},
    Bytes, ListableStorageTraits, ReadableStorageTraits, StorePrefix, WritableStorageTraits,
};

#[test]
fn memory_locations_are_isolated_by_name() -> Result<(), Box<dyn Error>> {
    let a = resolve("memory://url_test_a/ds", &Token::new())?;
    let b = resolve("memory://url_test_b/ds", &Token::new())?;
    a.storage.set(&a.prefix.key("k")?, Bytes::from_static(&[1]))?;
    assert!(b.storage.get(&b.prefix.key("k")?)?.is_none());
    assert_eq!(a.storage.list_prefix(&a.prefix)?.len(), 1);
    Ok(())
}

#[test]
fn registered_scheme() -> Result<(), Box<dyn Error>> {
    let backing = Arc::new(MemoryStore::new());
    let backing_clone = backing.clone();
    register_root_store("bucketstore", move |url, _token| {
        Ok(ResolvedStore {
            storage: backing_clone.clone(),
            prefix: StorePrefix::from_path(&format!("{}/{}", url.authority, url.path))?,
        })
    });
    let resolved = resolve("bucketstore://bucket/key/path", &Token::new())?;
    assert_eq!(resolved.prefix.as_str(), "bucket/key/path/");
    resolved
        .storage
        .set(&resolved.prefix.key("x")?, Bytes::from_static(&[7]))?;
    assert_eq!(backing.len(), 1);
    Ok(())
}

#[test]
fn unregistered_scheme() {
    assert!(matches!(
        resolve("azure://container/blob", &Token::new()),
        Err(StoreUrlError::UnsupportedScheme(_))
    ));
}
