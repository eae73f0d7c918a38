//! Block compression for raster payloads.
//!
//! Payload rasters are stored as one zlib block each. The block itself carries
//! no size header: the stream layer prefixes it with its compressed length and
//! the reader supplies the expected decompressed length.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Worst-case compressed size for `len` input bytes.
///
/// zlib stored blocks cost 5 bytes per 16 KiB plus a 6 byte header/trailer;
/// the extra slack covers the encoder's own rounding.
#[inline]
pub const fn compress_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

/// Compress `data` into a single zlib block.
pub fn compress_block(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(compress_bound(data.len())),
        Compression::default(),
    );
    encoder.write_all(data)?;
    let mut compressed = encoder.finish()?;
    compressed.shrink_to_fit();
    Ok(compressed)
}

/// Upper bound on zlib's expansion ratio, used to cap the initial buffer.
const MAX_INFLATE_RATIO: usize = 1032;

/// Decompress a block produced by [`compress_block`].
///
/// Fails with `DecompressionFailed` if the block is corrupt or does not
/// inflate to exactly `expected_len` bytes. Output past `expected_len` is
/// never produced, so an oversized block cannot exhaust memory.
pub fn decompress_block(block: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let decoder = ZlibDecoder::new(block);
    let mut out = Vec::with_capacity(expected_len.min(block.len().saturating_mul(MAX_INFLATE_RATIO)));
    decoder
        .take((expected_len as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| Error::DecompressionFailed(e.to_string()))?;

    if out.len() != expected_len {
        let got = if out.len() > expected_len {
            format!("more than {}", expected_len)
        } else {
            out.len().to_string()
        };
        return Err(Error::DecompressionFailed(format!(
            "expected {} bytes, got {}",
            expected_len, got
        )));
    }
    Ok(out)
}
