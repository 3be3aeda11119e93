use std::borrow::Cow;

use super::{ChunkCodecTraits, CodecError};

/// An `lz4` codec.
///
/// The decoded size is prepended to the compressed block.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4Codec;

impl Lz4Codec {
    /// Create a new `lz4` codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ChunkCodecTraits for Lz4Codec {
    fn encode<'a>(&self, decoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(&decoded_value)))
    }

    fn decode<'a>(&self, encoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError> {
        lz4_flex::decompress_size_prepended(&encoded_value)
            .map(Cow::Owned)
            .map_err(|err| CodecError::Other(format!("lz4 decompression failed: {err}")))
    }
}
