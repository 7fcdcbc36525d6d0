//! zlib blob codec.
//!
//! The placement blob and finished-history snapshots are stored
//! zlib-compressed in the coordination store; this module wraps the
//! (de)compression.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{CoordError, CoordResult};

/// Decompress a zlib blob.
pub fn inflate(bytes: &[u8]) -> CoordResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| CoordError::Decode(e.to_string()))?;
    Ok(out)
}

/// Compress a blob with zlib.
pub fn deflate(bytes: &[u8]) -> CoordResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CoordError::Decode(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CoordError::Decode(e.to_string()))
}
