use std::{borrow::Cow, io::Cursor};

use super::{ChunkCodecTraits, CodecError};

/// A `zstd` codec.
#[derive(Clone, Copy, Debug)]
pub struct ZstdCodec {
    compression_level: i32,
}

impl ZstdCodec {
    /// Create a new `zstd` codec.
    #[must_use]
    pub fn new(compression_level: i32) -> Self {
        Self { compression_level }
    }
}

impl ChunkCodecTraits for ZstdCodec {
    fn encode<'a>(&self, decoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError> {
        let out = zstd::encode_all(Cursor::new(decoded_value), self.compression_level)?;
        Ok(Cow::Owned(out))
    }

    fn decode<'a>(&self, encoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError> {
        let out = zstd::decode_all(Cursor::new(encoded_value))?;
        Ok(Cow::Owned(out))
    }
}
