//! Chunk compressors.
//!
//! Every tensor leaf has a [`Compressor`] that is applied to each encoded chunk.
//! The compressor of a leaf is fixed when the dataset is created and persisted in its metadata.
//!
//! | Compressor | Feature |
//! |------------|---------|
//! | `none`     |         |
//! | `gzip`     | `gzip`  |
//! | `zstd`     | `zstd`  |
//! | `lz4`      | `lz4`   |
//!
//! A dataset created with a compressor whose feature is disabled can still be opened, but its chunks cannot be decoded.

#[cfg(feature = "gzip")]
mod gzip;
#[cfg(feature = "lz4")]
mod lz4;
#[cfg(feature = "zstd")]
mod zstd;

#[cfg(feature = "gzip")]
pub use gzip::GzipCodec;
#[cfg(feature = "lz4")]
pub use lz4::Lz4Codec;
#[cfg(feature = "zstd")]
pub use self::zstd::ZstdCodec;

use std::{borrow::Cow, fmt::Display, str::FromStr, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::global_config;

/// A codec error.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// The compressor is not supported by this build.
    #[error("the {0} compressor is not supported, enable the {0} feature")]
    Unsupported(String),
    /// An unknown compressor name.
    #[error("unknown compressor {0}")]
    UnknownCompressor(String),
    /// The decoded chunk has an unexpected size.
    #[error("decoded chunk has {got} bytes, expected {expected}")]
    UnexpectedChunkDecodedSize {
        /// The decoded size.
        got: usize,
        /// The expected decoded size.
        expected: usize,
    },
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

/// Traits for a chunk bytes codec.
pub trait ChunkCodecTraits: Send + Sync {
    /// Encode chunk bytes.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails.
    fn encode<'a>(&self, decoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError>;

    /// Decode chunk bytes.
    ///
    /// # Errors
    /// Returns [`CodecError`] if a codec fails.
    fn decode<'a>(&self, encoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError>;
}

/// A chunk compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compressor {
    /// Chunks are stored uncompressed.
    #[default]
    None,
    /// Gzip.
    Gzip,
    /// Zstandard.
    Zstd,
    /// LZ4 with a prepended decoded size.
    Lz4,
}

impl Compressor {
    /// The name of the compressor.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
        }
    }

    /// Create the codec for this compressor with levels from the global configuration.
    ///
    /// Returns [`None`] for [`Compressor::None`].
    ///
    /// # Errors
    /// Returns [`CodecError::Unsupported`] if the compressor feature is disabled.
    pub fn codec(&self) -> Result<Option<Arc<dyn ChunkCodecTraits>>, CodecError> {
        match self {
            Self::None => Ok(None),
            #[cfg(feature = "gzip")]
            Self::Gzip => Ok(Some(Arc::new(GzipCodec::new(global_config().gzip_level())))),
            #[cfg(feature = "zstd")]
            Self::Zstd => Ok(Some(Arc::new(ZstdCodec::new(global_config().zstd_level())))),
            #[cfg(feature = "lz4")]
            Self::Lz4 => Ok(Some(Arc::new(Lz4Codec::new()))),
            #[allow(unreachable_patterns)]
            _ => Err(CodecError::Unsupported(self.name().to_string())),
        }
    }
}

impl Display for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compressor {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "null" | "" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "zstd" => Ok(Self::Zstd),
            "lz4" => Ok(Self::Lz4),
            _ => Err(CodecError::UnknownCompressor(s.to_string())),
        }
    }
}

impl Serialize for Compressor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Compressor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Encode decoded chunk bytes with an optional codec.
pub(crate) fn encode_chunk(
    codec: Option<&Arc<dyn ChunkCodecTraits>>,
    decoded: Vec<u8>,
) -> Result<Vec<u8>, CodecError> {
    match codec {
        Some(codec) => Ok(codec.encode(Cow::Owned(decoded))?.into_owned()),
        None => Ok(decoded),
    }
}

/// Decode encoded chunk bytes with an optional codec and validate the decoded size.
pub(crate) fn decode_chunk(
    codec: Option<&Arc<dyn ChunkCodecTraits>>,
    encoded: &[u8],
    expected: usize,
) -> Result<Vec<u8>, CodecError> {
    let decoded = match codec {
        Some(codec) => codec.decode(Cow::Borrowed(encoded))?.into_owned(),
        None => encoded.to_vec(),
    };
    if decoded.len() == expected {
        Ok(decoded)
    } else {
        Err(CodecError::UnexpectedChunkDecodedSize {
            got: decoded.len(),
            expected,
        })
    }
}
