//! A filesystem store for the `hub` crate.
//!
//! Each [`StoreKey`] maps to a file below the base directory of the store, with `/` delimited key
//! components mapping to nested directories.
//!
//! Call [`register_store_url`] to resolve `file://` locations and bare paths with
//! [`hub_storage::store_url::resolve`].
//!
//! ## Licence
//! `hub_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Once},
};

use hub_storage::{
    store_url::{register_root_store, ResolvedStore, StoreUrlError},
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeyError, StoreKeys, StorePrefix, WritableStorageTraits,
};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

/// A synchronous file system store.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    sort: bool,
    readonly: bool,
    files: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_path`.
    ///
    /// The base directory is not created until the first write.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }
        let readonly = if base_path.exists() {
            let md = std::fs::metadata(&base_path).map_err(FilesystemStoreCreateError::IOError)?;
            if !md.is_dir() {
                return Err(FilesystemStoreCreateError::NotADirectory(base_path));
            }
            md.permissions().readonly()
        } else {
            false
        };

        Ok(Self {
            base_path,
            sort: false,
            readonly,
            files: Mutex::default(),
        })
    }

    /// Makes the store sort directories/files when walking.
    #[must_use]
    pub const fn sorted(mut self) -> Self {
        self.sort = true;
        self
    }

    /// Returns the base path of the store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(key.as_str().split('/'));
        path
    }

    /// Maps a filesystem [`PathBuf`] to a [`StoreKey`].
    fn fspath_to_key(&self, path: &Path) -> Result<StoreKey, StoreKeyError> {
        let relative = pathdiff::diff_paths(path, &self.base_path).unwrap_or_default();
        let key = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .join("/");
        StoreKey::new(key)
    }

    /// Maps a store [`StorePrefix`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn prefix_to_fs_path(&self, prefix: &StorePrefix) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(prefix.as_str().split('/').filter(|component| !component.is_empty()));
        path
    }

    fn get_file_mutex(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        self.files
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone()
    }

    fn walk_keys(&self, path: &Path) -> StoreKeys {
        let walk = WalkDir::new(path);
        let walk = if self.sort {
            walk.sort_by_file_name()
        } else {
            walk
        };
        walk.into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.fspath_to_key(entry.path()).ok())
            .collect()
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let file = self.get_file_mutex(key);
        let _lock = file.read();

        let mut file = match OpenOptions::new().read(true).open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(Some(Bytes::from(buffer)))
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }
        let file = self.get_file_mutex(key);
        let _lock = file.write();

        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(key_path)?;
        file.write_all(&value)?;
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }
        let file = self.get_file_mutex(key);
        let _lock = file.write();

        match std::fs::remove_file(self.key_to_fspath(key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }
        let _lock = self.files.lock(); // lock all operations

        match std::fs::remove_dir_all(self.prefix_to_fs_path(prefix)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl ListableStorageTraits for FilesystemStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        Ok(self.walk_keys(&self.base_path))
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self.walk_keys(&self.prefix_to_fs_path(prefix)))
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
    /// The path exists and is not a directory.
    #[error("base path {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Register the filesystem store with the global store registry for the `file` scheme.
///
/// Bare paths parse with the `file` scheme, so they are resolved by this store too.
/// The whole location is the base directory of the store, so the dataset prefix is the root.
///
/// Registration happens once, later calls do nothing.
pub fn register_store_url() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        register_root_store("file", |url, _token| {
            let store = FilesystemStore::new(&url.path)
                .map_err(|err| StoreUrlError::StoreCreationFailed(err.to_string()))?;
            Ok(ResolvedStore {
                storage: Arc::new(store.sorted()),
                prefix: StorePrefix::root(),
            })
        });
    });
}
