//! ROOT compression settings and block compression for the write path.
//!
//! ROOT encodes the compression choice as a single integer
//! `algorithm * 100 + level`. A setting of `0` stores data raw; settings
//! `1..=9` are the legacy spelling of zlib at that level.

use std::fmt;
use std::hash::Hasher;
use std::io::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decompress::BLOCK_HEADER_LEN;
use crate::error::{Result, RootError};

/// Largest input a single compressed block may cover (3-byte size field).
const MAX_BLOCK_INPUT: usize = 0xFF_FFFF;

/// Compression algorithms ROOT knows how to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// zlib (`ZL` blocks).
    Zlib,
    /// LZMA in an xz container (`XZ` blocks).
    #[serde(alias = "xz")]
    Lzma,
    /// LZ4 block format with xxhash64 checksum (`L4` blocks).
    Lz4,
    /// Zstandard frames (`ZS` blocks).
    Zstd,
}

impl Algorithm {
    /// ROOT's numeric algorithm id (the hundreds digit of the setting).
    pub fn root_id(self) -> i32 {
        match self {
            Algorithm::Zlib => 1,
            Algorithm::Lzma => 2,
            Algorithm::Lz4 => 4,
            Algorithm::Zstd => 5,
        }
    }

    fn from_root_id(id: i32) -> Option<Self> {
        match id {
            0 | 1 => Some(Algorithm::Zlib),
            2 => Some(Algorithm::Lzma),
            4 => Some(Algorithm::Lz4),
            5 => Some(Algorithm::Zstd),
            _ => None,
        }
    }

    fn tag(self) -> (&'static [u8; 2], u8) {
        match self {
            Algorithm::Zlib => (b"ZL", 8),
            Algorithm::Lzma => (b"XZ", 0),
            Algorithm::Lz4 => (b"L4", 1),
            Algorithm::Zstd => (b"ZS", 1),
        }
    }
}

/// Compression applied to written objects and baskets.
///
/// Serialized as its string form (`"zlib:1"`, `"zstd:5"`, `"none"`).
///
/// Only zlib compresses differently per level. The LZ4, zstd and LZMA
/// encoders each run at one fixed setting; for them the level is recorded
/// in the ROOT setting (`fCompress`) and does not change the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Compression {
    /// Algorithm; ignored when `level == 0`.
    pub algorithm: Algorithm,
    /// Level 0 (stored raw) to 9.
    pub level: u8,
}

impl Default for Compression {
    fn default() -> Self {
        Self { algorithm: Algorithm::Zlib, level: 1 }
    }
}

impl Compression {
    /// Store everything uncompressed.
    pub fn none() -> Self {
        Self { algorithm: Algorithm::Zlib, level: 0 }
    }

    /// Construct from algorithm and level (clamped to 9).
    pub fn new(algorithm: Algorithm, level: u8) -> Self {
        Self { algorithm, level: level.min(9) }
    }

    /// Decode a ROOT `fCompress` setting.
    pub fn from_setting(setting: i32) -> Result<Self> {
        if setting <= 0 {
            return Ok(Self::none());
        }
        let algorithm = Algorithm::from_root_id(setting / 100).ok_or_else(|| {
            RootError::Compression(format!("unknown compression setting {}", setting))
        })?;
        Ok(Self::new(algorithm, (setting % 100) as u8))
    }

    /// Encode as a ROOT `fCompress` setting.
    pub fn setting(self) -> i32 {
        if self.level == 0 { 0 } else { self.algorithm.root_id() * 100 + self.level as i32 }
    }

    /// Whether data is stored raw.
    pub fn is_none(self) -> bool {
        self.level == 0
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        let name = match self.algorithm {
            Algorithm::Zlib => "zlib",
            Algorithm::Lzma => "lzma",
            Algorithm::Lz4 => "lz4",
            Algorithm::Zstd => "zstd",
        };
        write!(f, "{}:{}", name, self.level)
    }
}

impl FromStr for Compression {
    type Err = RootError;

    /// Parse `none`, `zlib`, `zstd:5`, or a numeric ROOT setting such as `404`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::none());
        }
        if let Ok(setting) = s.parse::<i32>() {
            return Self::from_setting(setting);
        }
        let (name, level) = match s.split_once(':') {
            Some((n, l)) => {
                let level = l.parse::<u8>().map_err(|_| {
                    RootError::Compression(format!("invalid compression level in '{}'", s))
                })?;
                (n, level)
            }
            None => (s, 1),
        };
        let algorithm = match name.to_ascii_lowercase().as_str() {
            "zlib" => Algorithm::Zlib,
            "lzma" | "xz" => Algorithm::Lzma,
            "lz4" => Algorithm::Lz4,
            "zstd" => Algorithm::Zstd,
            _ => {
                return Err(RootError::Compression(format!(
                    "unknown compression algorithm '{}'",
                    name
                )));
            }
        };
        Ok(Self::new(algorithm, level))
    }
}

impl TryFrom<String> for Compression {
    type Error = RootError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Compression> for String {
    fn from(c: Compression) -> Self {
        c.to_string()
    }
}

/// Compress `data` into ROOT blocks.
///
/// Returns the input unchanged when compression is disabled or does not
/// shrink the data; readers detect raw storage by comparing the stored and
/// object lengths.
pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    if compression.is_none() || data.is_empty() {
        return Ok(data.to_vec());
    }

    let mut out = Vec::with_capacity(data.len() / 2 + BLOCK_HEADER_LEN);
    for chunk in data.chunks(MAX_BLOCK_INPUT) {
        let payload = compress_block(chunk, compression)?;
        if payload.len() > MAX_BLOCK_INPUT {
            return Ok(data.to_vec());
        }
        let (tag, method) = compression.algorithm.tag();
        out.extend_from_slice(tag);
        out.push(method);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes()[..3]);
        out.extend_from_slice(&payload);
    }

    if out.len() >= data.len() {
        return Ok(data.to_vec());
    }
    Ok(out)
}

fn compress_block(chunk: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression.algorithm {
        Algorithm::Zlib => {
            let level = flate2::Compression::new(compression.level as u32);
            let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), level);
            enc.write_all(chunk).map_err(|e| RootError::Compression(format!("zlib: {}", e)))?;
            enc.finish().map_err(|e| RootError::Compression(format!("zlib: {}", e)))
        }
        Algorithm::Lzma => {
            let mut out = Vec::new();
            lzma_rs::xz_compress(&mut std::io::BufReader::new(chunk), &mut out)
                .map_err(|e| RootError::Compression(format!("xz: {}", e)))?;
            Ok(out)
        }
        Algorithm::Lz4 => {
            let block = lz4_flex::block::compress(chunk);
            let mut hasher = twox_hash::XxHash64::with_seed(0);
            hasher.write(&block);
            let mut out = Vec::with_capacity(block.len() + 8);
            out.extend_from_slice(&hasher.finish().to_be_bytes());
            out.extend_from_slice(&block);
            Ok(out)
        }
        // the pure-Rust encoder only implements its fastest level
        Algorithm::Zstd => Ok(ruzstd::encoding::compress_to_vec(
            chunk,
            ruzstd::encoding::CompressionLevel::Fastest,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompress::decompress;

    fn sample() -> Vec<u8> {
        (0..20_000u32).flat_map(|i| ((i % 97) as f64).to_be_bytes()).collect()
    }

    #[test]
    fn settings_round_trip() {
        for s in [0, 101, 109, 207, 404, 505] {
            assert_eq!(Compression::from_setting(s).unwrap().setting(), s);
        }
        assert_eq!(Compression::from_setting(6).unwrap(), Compression::new(Algorithm::Zlib, 6));
        assert!(Compression::from_setting(901).is_err());
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("zstd:5".parse::<Compression>().unwrap().setting(), 505);
        assert_eq!("LZ4".parse::<Compression>().unwrap().setting(), 401);
        assert_eq!("xz:9".parse::<Compression>().unwrap().setting(), 209);
        assert_eq!("none".parse::<Compression>().unwrap().setting(), 0);
        assert_eq!("101".parse::<Compression>().unwrap().setting(), 101);
        assert!("brotli".parse::<Compression>().is_err());
        assert!("zlib:x".parse::<Compression>().is_err());
    }

    #[test]
    fn every_algorithm_decompresses_back() {
        let data = sample();
        for alg in [Algorithm::Zlib, Algorithm::Lzma, Algorithm::Lz4, Algorithm::Zstd] {
            let packed = compress(&data, Compression::new(alg, 5)).unwrap();
            assert!(packed.len() < data.len(), "{alg:?} did not shrink sample data");
            assert_eq!(decompress(&packed, data.len()).unwrap(), data, "{alg:?}");
        }
    }

    #[test]
    fn level_only_changes_zlib_output() {
        let data = sample();
        let packed = |alg, level| compress(&data, Compression::new(alg, level)).unwrap();
        assert_ne!(packed(Algorithm::Zlib, 1), packed(Algorithm::Zlib, 9));
        for alg in [Algorithm::Lzma, Algorithm::Lz4, Algorithm::Zstd] {
            assert_eq!(packed(alg, 1), packed(alg, 9), "{alg:?}");
        }
        let zstd9 = Compression::new(Algorithm::Zstd, 9);
        assert_eq!(zstd9.setting(), 509);
        assert_eq!(Compression::from_setting(zstd9.setting()).unwrap(), zstd9);
    }

    #[test]
    fn incompressible_data_is_stored_raw() {
        let data: Vec<u8> = (0..64u8).collect();
        let packed = compress(&data, Compression::default()).unwrap();
        assert_eq!(packed, data);
    }

    #[test]
    fn lz4_blocks_carry_checksum() {
        let data = sample();
        let packed = compress(&data, Compression::new(Algorithm::Lz4, 4)).unwrap();
        assert_eq!(&packed[..2], b"L4");
        let payload = &packed[BLOCK_HEADER_LEN..];
        let mut hasher = twox_hash::XxHash64::with_seed(0);
        let c_size = u32::from_le_bytes([packed[3], packed[4], packed[5], 0]) as usize;
        hasher.write(&payload[8..c_size]);
        assert_eq!(&payload[..8], &hasher.finish().to_be_bytes());
    }
}
