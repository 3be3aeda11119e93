use std::{
    borrow::Cow,
    io::{Cursor, Read},
};

use flate2::bufread::{GzDecoder, GzEncoder};

use super::{ChunkCodecTraits, CodecError};

/// A `gzip` codec.
#[derive(Clone, Copy, Debug)]
pub struct GzipCodec {
    compression_level: u32,
}

impl GzipCodec {
    /// Create a new `gzip` codec with a compression level in `0..=9`.
    #[must_use]
    pub fn new(compression_level: u32) -> Self {
        Self {
            compression_level: compression_level.min(9),
        }
    }
}

impl ChunkCodecTraits for GzipCodec {
    fn encode<'a>(&self, decoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(Cow::Owned(out))
    }

    fn decode<'a>(&self, encoded_value: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, CodecError> {
        let mut decoder = GzDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(Cow::Owned(out))
    }
}
