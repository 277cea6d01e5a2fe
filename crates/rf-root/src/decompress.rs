//! ROOT compression block decompression (ZL = zlib, L4 = LZ4, ZS = ZSTD, XZ = LZMA).
//!
//! ROOT writes compressed data as one or more 9-byte-header blocks:
//! ```text
//! bytes 0-1:  algorithm tag ("ZL", "XZ", "L4", "ZS")
//! byte  2:    method (ignored)
//! bytes 3-5:  compressed size   (3-byte little-endian)
//! bytes 6-8:  uncompressed size (3-byte little-endian)
//! ```
//! The compressed payload immediately follows the 9-byte header.

use std::io::Read;

use crate::error::{Result, RootError};

/// Size of a compressed block header.
pub const BLOCK_HEADER_LEN: usize = 9;

/// Refuse to allocate more than this for a single object.
const MAX_OBJECT_LEN: usize = 1 << 30;

std::thread_local! {
    static ZSTD_DECODER: std::cell::RefCell<ruzstd::decoding::FrameDecoder> =
        std::cell::RefCell::new(ruzstd::decoding::FrameDecoder::new());
}

/// Decompress ROOT-compressed data into `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    if expected_len > MAX_OBJECT_LEN {
        return Err(RootError::Decompression(format!(
            "object claims {} uncompressed bytes (limit {})",
            expected_len, MAX_OBJECT_LEN
        )));
    }

    let mut out = Vec::with_capacity(expected_len);
    let mut offset = 0;

    while out.len() < expected_len && offset + BLOCK_HEADER_LEN <= src.len() {
        let tag = &src[offset..offset + 2];
        let c_size = read_le24(&src[offset + 3..offset + 6]);
        let u_size = read_le24(&src[offset + 6..offset + 9]);
        offset += BLOCK_HEADER_LEN;

        let end = offset + c_size;
        if end > src.len() {
            return Err(RootError::Decompression(format!(
                "compressed block claims {} bytes but only {} remain",
                c_size,
                src.len() - offset
            )));
        }
        if out.len() + u_size > expected_len {
            return Err(RootError::Decompression(format!(
                "block of {} bytes overruns expected object length {}",
                u_size, expected_len
            )));
        }

        let compressed = &src[offset..end];
        let decompressed = match tag {
            b"ZL" => decompress_zlib(compressed, u_size)?,
            b"L4" => decompress_lz4(compressed, u_size)?,
            b"ZS" => decompress_zstd(compressed, u_size)?,
            b"XZ" => decompress_xz(compressed, u_size)?,
            _ => {
                return Err(RootError::Decompression(format!(
                    "unsupported compression algorithm: {:?}",
                    String::from_utf8_lossy(tag)
                )));
            }
        };

        if decompressed.len() != u_size {
            return Err(RootError::Decompression(format!(
                "expected {} uncompressed bytes, got {}",
                u_size,
                decompressed.len()
            )));
        }

        out.extend_from_slice(&decompressed);
        offset = end;
    }

    if out.len() != expected_len {
        return Err(RootError::Decompression(format!(
            "total decompressed length {} != expected {}",
            out.len(),
            expected_len
        )));
    }

    Ok(out)
}

fn decompress_zlib(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected);
    decoder.read_to_end(&mut out).map_err(|e| RootError::Decompression(format!("zlib: {}", e)))?;
    Ok(out)
}

fn decompress_lz4(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    // An 8-byte xxhash64 of the compressed payload precedes the LZ4 block.
    if data.len() < 8 {
        return Err(RootError::Decompression("LZ4 block too small for checksum header".into()));
    }
    lz4_flex::block::decompress(&data[8..], expected)
        .map_err(|e| RootError::Decompression(format!("lz4: {}", e)))
}

fn decompress_zstd(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(expected);
    ZSTD_DECODER
        .with(|cell| cell.borrow_mut().decode_all_to_vec(data, &mut out))
        .map_err(|e| RootError::Decompression(format!("zstd: {}", e)))?;
    Ok(out)
}

fn decompress_xz(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut input = std::io::BufReader::new(data);
    let mut out = Vec::with_capacity(expected);
    lzma_rs::xz_decompress(&mut input, &mut out)
        .map_err(|e| RootError::Decompression(format!("xz: {}", e)))?;
    Ok(out)
}

/// Read a 3-byte little-endian unsigned integer.
fn read_le24(b: &[u8]) -> usize {
    b[0] as usize | ((b[1] as usize) << 8) | ((b[2] as usize) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a ROOT-style compression block from tag, compressed data, and original len.
    fn make_root_block(tag: &[u8; 2], method: u8, compressed: &[u8], u_len: usize) -> Vec<u8> {
        let mut block = Vec::new();
        block.extend_from_slice(tag);
        block.push(method);
        block.extend_from_slice(&(compressed.len() as u32).to_le_bytes()[..3]);
        block.extend_from_slice(&(u_len as u32).to_le_bytes()[..3]);
        block.extend_from_slice(compressed);
        block
    }

    #[test]
    fn le24_values() {
        assert_eq!(read_le24(&[0x10, 0x00, 0x00]), 16);
        assert_eq!(read_le24(&[0xff, 0xff, 0xff]), 0xFF_FFFF);
        assert_eq!(read_le24(&[0x00, 0x01, 0x00]), 256);
    }

    #[test]
    fn zlib_block() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let original = b"Hello ROOT compression world! Repeated data: AAAAAAAAAA";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();
        let block = make_root_block(b"ZL", 0x08, &compressed, original.len());

        assert_eq!(decompress(&block, original.len()).unwrap(), original);
    }

    #[test]
    fn zstd_block() {
        let original = b"Hello ROOT ZSTD compression! Repeated data: BBBBBBBBBB";
        let compressed = ruzstd::encoding::compress_to_vec(
            &original[..],
            ruzstd::encoding::CompressionLevel::Fastest,
        );
        let block = make_root_block(b"ZS", 0x01, &compressed, original.len());
        assert_eq!(decompress(&block, original.len()).unwrap(), &original[..]);
    }

    #[test]
    fn xz_block() {
        let original = b"Hello ROOT XZ compression! Repeated data: CCCCCCCCCC";
        let mut compressed = Vec::new();
        lzma_rs::xz_compress(&mut std::io::BufReader::new(&original[..]), &mut compressed).unwrap();
        let block = make_root_block(b"XZ", 0x00, &compressed, original.len());
        assert_eq!(decompress(&block, original.len()).unwrap(), &original[..]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let block = make_root_block(b"QQ", 0, &[1, 2, 3], 3);
        assert!(matches!(decompress(&block, 3), Err(RootError::Decompression(_))));
    }

    #[test]
    fn truncated_block_is_rejected() {
        let mut block = make_root_block(b"ZL", 8, &[0u8; 16], 32);
        block.truncate(12);
        assert!(decompress(&block, 32).is_err());
    }

    #[test]
    fn oversized_object_is_rejected() {
        assert!(decompress(&[], MAX_OBJECT_LEN + 1).is_err());
    }
}
