//! `hub` global configuration options.
//!
//! See [`Config`] for the list of options.

use std::sync::OnceLock;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::codec::Compressor;

/// Global configuration options for the `hub` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
/// The configuration is read when a dataset is created or opened, so changes do not affect open datasets.
///
/// ## Chunk Target Bytes
/// > default: 16 MiB
///
/// The approximate uncompressed target size of a chunk when chunk shapes are derived automatically.
/// The sample axis is chunked first and leading inner axes are split only when a single sample exceeds the target.
///
/// ## Chunk Cache Capacity
/// > default: `4`
///
/// The number of decoded chunks held in the least-recently-used cache of each tensor.
/// A capacity of zero disables caching.
///
/// ## Default Compressor
/// > default: [`Compressor::Lz4`] if the `lz4` feature is enabled, otherwise the first enabled of `zstd` and `gzip`
///
/// The compressor assigned to tensors that do not declare one.
///
/// ## Gzip Level / Zstd Level
/// > default: `6` / `3`
///
/// ## Lazy By Default
/// > default: `true`
///
/// Whether datasets are opened in lazy mode when the builder does not say otherwise.
#[derive(Debug, Clone)]
pub struct Config {
    chunk_target_bytes: u64,
    chunk_cache_capacity: usize,
    default_compressor: Compressor,
    gzip_level: u32,
    zstd_level: i32,
    lazy_by_default: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_target_bytes: 16 * 1024 * 1024,
            chunk_cache_capacity: 4,
            default_compressor: default_compressor(),
            gzip_level: 6,
            zstd_level: 3,
            lazy_by_default: true,
        }
    }
}

#[allow(unreachable_code)]
fn default_compressor() -> Compressor {
    #[cfg(feature = "lz4")]
    return Compressor::Lz4;
    #[cfg(feature = "zstd")]
    return Compressor::Zstd;
    #[cfg(feature = "gzip")]
    return Compressor::Gzip;
    Compressor::None
}

impl Config {
    /// Get the [chunk target bytes](#chunk-target-bytes) configuration.
    #[must_use]
    pub fn chunk_target_bytes(&self) -> u64 {
        self.chunk_target_bytes
    }

    /// Set the [chunk target bytes](#chunk-target-bytes) configuration.
    pub fn set_chunk_target_bytes(&mut self, chunk_target_bytes: u64) -> &mut Self {
        self.chunk_target_bytes = chunk_target_bytes.max(1);
        self
    }

    /// Get the [chunk cache capacity](#chunk-cache-capacity) configuration.
    #[must_use]
    pub fn chunk_cache_capacity(&self) -> usize {
        self.chunk_cache_capacity
    }

    /// Set the [chunk cache capacity](#chunk-cache-capacity) configuration.
    pub fn set_chunk_cache_capacity(&mut self, chunk_cache_capacity: usize) -> &mut Self {
        self.chunk_cache_capacity = chunk_cache_capacity;
        self
    }

    /// Get the [default compressor](#default-compressor) configuration.
    #[must_use]
    pub fn default_compressor(&self) -> Compressor {
        self.default_compressor
    }

    /// Set the [default compressor](#default-compressor) configuration.
    pub fn set_default_compressor(&mut self, compressor: Compressor) -> &mut Self {
        self.default_compressor = compressor;
        self
    }

    /// Get the [gzip level](#gzip-level--zstd-level) configuration.
    #[must_use]
    pub fn gzip_level(&self) -> u32 {
        self.gzip_level
    }

    /// Set the [gzip level](#gzip-level--zstd-level) configuration. Values are clamped to `0..=9`.
    pub fn set_gzip_level(&mut self, level: u32) -> &mut Self {
        self.gzip_level = level.min(9);
        self
    }

    /// Get the [zstd level](#gzip-level--zstd-level) configuration.
    #[must_use]
    pub fn zstd_level(&self) -> i32 {
        self.zstd_level
    }

    /// Set the [zstd level](#gzip-level--zstd-level) configuration.
    pub fn set_zstd_level(&mut self, level: i32) -> &mut Self {
        self.zstd_level = level;
        self
    }

    /// Get the [lazy by default](#lazy-by-default) configuration.
    #[must_use]
    pub fn lazy_by_default(&self) -> bool {
        self.lazy_by_default
    }

    /// Set the [lazy by default](#lazy-by-default) configuration.
    pub fn set_lazy_by_default(&mut self, lazy: bool) -> &mut Self {
        self.lazy_by_default = lazy;
        self
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `hub` configuration.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read()
}

/// Returns a mutable reference to the global `hub` configuration.
///
/// Do not hold the guard while creating or opening a dataset, it will deadlock.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).write()
}
