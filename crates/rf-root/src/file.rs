//! TFile header parsing and the top-level ROOT file interface.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::branch_reader::BranchReader;
use crate::cache::{BasketCache, CacheConfig};
use crate::compress::Compression;
use crate::data::BranchData;
use crate::datasource::DataSource;
use crate::decompress::decompress;
use crate::directory::{Directory, DirectoryHeader, UUID_LEN, is_directory_class};
use crate::error::{Result, RootError};
use crate::key::{Key, KeyInfo};
use crate::objects;
use crate::rbuffer::RBuffer;
use crate::tree::Tree;
use crate::wbuffer::WBuffer;

/// Magic bytes every ROOT file starts with.
pub const ROOT_MAGIC: &[u8; 4] = b"root";
/// `fVersion` values at or above this use 64-bit seek pointers.
pub const LARGE_FILE_VERSION: u32 = 1_000_000;
/// Files shorter than this cannot hold a complete header.
const MIN_FILE_LEN: usize = 64;
/// Subdirectory nesting followed before giving up (guards against cyclic seeks).
const MAX_DIRECTORY_DEPTH: usize = 64;

/// The file header stored in the first bytes of a ROOT file.
///
/// ```text
/// offset  size  field
///    0      4   magic "root"
///    4      4   fVersion
///    8      4   fBEGIN
///   12    4|8   fEND
///         4|8   fSeekFree
///           4   fNbytesFree
///           4   nfree
///           4   fNbytesName
///           1   fUnits
///           4   fCompress
///         4|8   fSeekInfo
///           4   fNbytesInfo
///          18   fUUID
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// ROOT version that wrote the file (+1000000 for large files).
    pub version: u32,
    /// Offset of the first record (the `TFile` key).
    pub begin: u64,
    /// First byte past the last record.
    pub end: u64,
    /// Seek of the free-segments record.
    pub seek_free: u64,
    /// Size of the free-segments record.
    pub nbytes_free: u32,
    /// Number of free segments.
    pub nfree: u32,
    /// Size of the `TFile` key plus its name and title.
    pub nbytes_name: u32,
    /// Size of seek pointers in bytes (4 or 8).
    pub units: u8,
    /// Default compression setting.
    pub compress: i32,
    /// Seek of the StreamerInfo record.
    pub seek_info: u64,
    /// Size of the StreamerInfo record.
    pub nbytes_info: u32,
    /// UUID version + 16 UUID bytes.
    pub uuid: [u8; UUID_LEN],
}

impl FileHeader {
    /// Parse the header from the start of `data`.
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_FILE_LEN || &data[..4] != ROOT_MAGIC {
            return Err(RootError::BadMagic);
        }
        let mut r = RBuffer::new(data);
        r.skip(4)?;

        let version = r.read_u32()?;
        let large = version >= LARGE_FILE_VERSION;

        let begin = r.read_u32()? as u64;
        let end = read_seek(&mut r, large)?;
        let seek_free = read_seek(&mut r, large)?;
        let nbytes_free = r.read_u32()?;
        let nfree = r.read_u32()?;
        let nbytes_name = r.read_u32()?;
        let units = r.read_u8()?;
        let compress = r.read_i32()?;
        let seek_info = read_seek(&mut r, large)?;
        let nbytes_info = r.read_u32()?;
        let mut uuid = [0u8; UUID_LEN];
        if r.remaining() >= UUID_LEN {
            let raw = r.read_bytes(UUID_LEN)?;
            uuid.copy_from_slice(raw);
        }

        Ok(Self {
            version,
            begin,
            end,
            seek_free,
            nbytes_free,
            nfree,
            nbytes_name,
            units,
            compress,
            seek_info,
            nbytes_info,
            uuid,
        })
    }

    /// Whether seek pointers are 64-bit.
    pub fn is_large(&self) -> bool {
        self.version >= LARGE_FILE_VERSION
    }

    /// Serialize the header (without the zero padding up to `fBEGIN`).
    pub fn write(&self, w: &mut WBuffer) {
        let large = self.is_large();
        let seek = |w: &mut WBuffer, v: u64| {
            if large { w.write_u64(v) } else { w.write_u32(v as u32) }
        };

        w.write_bytes(ROOT_MAGIC);
        w.write_u32(self.version);
        w.write_u32(self.begin as u32);
        seek(w, self.end);
        seek(w, self.seek_free);
        w.write_u32(self.nbytes_free);
        w.write_u32(self.nfree);
        w.write_u32(self.nbytes_name);
        w.write_u8(self.units);
        w.write_i32(self.compress);
        seek(w, self.seek_info);
        w.write_u32(self.nbytes_info);
        w.write_bytes(&self.uuid);
    }
}

fn read_seek(r: &mut RBuffer, large: bool) -> Result<u64> {
    if large { r.read_u64() } else { Ok(r.read_u32()? as u64) }
}

/// Parse the top directory record at `fBEGIN + fNbytesName`.
pub(crate) fn read_top_directory_header(
    data: &[u8],
    header: &FileHeader,
) -> Result<DirectoryHeader> {
    let offset = header.begin.saturating_add(header.nbytes_name as u64);
    if offset >= data.len() as u64 {
        return Err(RootError::Deserialization(format!(
            "top directory at {} lies past end of file ({} bytes)",
            offset,
            data.len()
        )));
    }
    let mut r = RBuffer::new(data);
    r.set_pos(offset as usize);
    DirectoryHeader::read(&mut r)
}

/// Read and decompress the object stored under `key`.
pub fn read_key_payload(data: &[u8], key: &Key) -> Result<Vec<u8>> {
    let start = usize::try_from(key.seek_key)
        .map_err(|_| RootError::Deserialization(format!("seek {} out of range", key.seek_key)))?;
    let len = key.n_bytes as usize;
    let end = start.checked_add(len).filter(|&end| end <= data.len()).ok_or(
        RootError::BufferUnderflow {
            offset: start,
            need: len,
            have: data.len().saturating_sub(start),
        },
    )?;
    if key.key_len as usize > len {
        return Err(RootError::Deserialization(format!(
            "key '{}' header ({} bytes) is longer than its record ({} bytes)",
            key.name, key.key_len, len
        )));
    }

    let stored = &data[start + key.key_len as usize..end];
    if key.is_compressed() { decompress(stored, key.obj_len as usize) } else { Ok(stored.to_vec()) }
}

/// A ROOT file opened for reading trees.
pub struct RootFile {
    data: DataSource,
    header: FileHeader,
    top: DirectoryHeader,
    path: PathBuf,
    /// Decompressed basket payloads, shared by every branch reader of this file.
    basket_cache: BasketCache,
}

impl RootFile {
    /// Open a ROOT file from disk using a read-only memory map.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        Self::from_datasource(DataSource::map(&file)?, path)
    }

    /// Parse a ROOT file held in memory; `path` is only used in diagnostics.
    pub fn from_bytes(data: Vec<u8>, path: impl Into<PathBuf>) -> Result<Self> {
        Self::from_datasource(DataSource::Owned(data), path.into())
    }

    fn from_datasource(data: DataSource, path: PathBuf) -> Result<Self> {
        let header = FileHeader::read(&data)?;
        let top = read_top_directory_header(&data, &header)?;
        log::info!(
            "opened {} (ROOT version {}, {} bytes, {})",
            path.display(),
            header.version % LARGE_FILE_VERSION,
            data.len(),
            if header.is_large() { "large" } else { "small" }
        );
        Ok(Self { data, header, top, path, basket_cache: BasketCache::default() })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// ROOT version that wrote the file (e.g. `62800` for 6.28/00).
    pub fn version(&self) -> u32 {
        self.header.version % LARGE_FILE_VERSION
    }

    /// Default compression recorded in the header.
    pub fn compression(&self) -> Result<Compression> {
        Compression::from_setting(self.header.compress)
    }

    /// Whether the file uses 64-bit seek pointers.
    pub fn is_large(&self) -> bool {
        self.header.is_large()
    }

    /// Raw file bytes.
    pub fn file_data(&self) -> &[u8] {
        &self.data
    }

    /// List all keys in the top-level directory.
    pub fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let dir = self.read_top_directory()?;
        Ok(dir.keys().iter().map(KeyInfo::from_key).collect())
    }

    /// Paths of every TTree in the file, subdirectories included
    /// (`"dir/tree"`), in key order, each listed once.
    pub fn list_trees(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.collect_trees(&self.read_top_directory()?, "", 0, &mut out)?;
        Ok(out)
    }

    fn collect_trees(
        &self,
        dir: &Directory,
        prefix: &str,
        depth: usize,
        out: &mut Vec<String>,
    ) -> Result<()> {
        for key in dir.keys() {
            let path = if prefix.is_empty() {
                key.name.clone()
            } else {
                format!("{}/{}", prefix, key.name)
            };
            if key.class_name == "TTree" {
                if !out.contains(&path) {
                    out.push(path);
                }
            } else if is_directory_class(&key.class_name) {
                // older cycles of a directory hold stale key lists
                if dir.max_cycle(&key.name) != key.cycle {
                    continue;
                }
                if depth >= MAX_DIRECTORY_DEPTH {
                    log::debug!("not descending into {}: nesting too deep", path);
                    continue;
                }
                let sub = self.read_subdirectory(key)?;
                self.collect_trees(&sub, &path, depth + 1, out)?;
            } else {
                log::debug!("skipping key {} of class {}", path, key.class_name);
            }
        }
        Ok(())
    }

    /// Read a TTree by path (`"tree"` or `"dir/sub/tree"`), highest cycle.
    pub fn get_tree(&self, path: &str) -> Result<Tree> {
        let key = match self.find_key(path) {
            Ok(key) => key,
            Err(RootError::KeyNotFound(_)) => return Err(RootError::TreeNotFound(path.to_string())),
            Err(e) => return Err(e),
        };
        if key.class_name != "TTree" {
            return Err(RootError::TreeNotFound(format!(
                "'{}' is a {}, not a TTree",
                path, key.class_name
            )));
        }

        let payload = self.read_key_payload(&key)?;
        let tree = objects::read_ttree(&payload, key.key_len as usize)?;
        log::debug!(
            "tree {};{}: {} entries, {} branches",
            path,
            key.cycle,
            tree.entries,
            tree.branches.len()
        );
        Ok(tree)
    }

    /// Resolve a slash-separated key path, following subdirectories.
    pub fn find_key(&self, path: &str) -> Result<Key> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = parts.split_last() else {
            return Err(RootError::KeyNotFound(path.to_string()));
        };

        let mut dir = self.read_top_directory()?;
        for &part in dirs {
            let key = dir
                .find_key(part)
                .ok_or_else(|| RootError::KeyNotFound(format!("{} (in path {})", part, path)))?;
            if !is_directory_class(&key.class_name) {
                return Err(RootError::KeyNotFound(format!(
                    "'{}' is not a directory (class {}) in path {}",
                    part, key.class_name, path
                )));
            }
            dir = self.read_subdirectory(key)?;
        }

        dir.find_key(last).cloned().ok_or_else(|| RootError::KeyNotFound(path.to_string()))
    }

    fn read_top_directory(&self) -> Result<Directory> {
        Directory::read_key_list(&self.data, self.top.seek_keys)
    }

    fn read_subdirectory(&self, key: &Key) -> Result<Directory> {
        let payload = self.read_key_payload(key)?;
        Directory::read_from_payload(&payload, &self.data)
    }

    /// Read and decompress the payload of a key.
    pub fn read_key_payload(&self, key: &Key) -> Result<Vec<u8>> {
        read_key_payload(&self.data, key)
    }

    // ── Branch access ──────────────────────────────────────────

    /// Create a [`BranchReader`] for the named branch, backed by this file's basket cache.
    pub fn branch_reader<'a>(&'a self, tree: &'a Tree, branch: &str) -> Result<BranchReader<'a>> {
        let info = tree
            .find_branch(branch)
            .ok_or_else(|| RootError::BranchNotFound(branch.to_string()))?;
        BranchReader::new(&self.data, info, Some(&self.basket_cache))
    }

    /// Read entries `range` of a flat branch.
    pub fn read_branch(&self, tree: &Tree, branch: &str, range: Range<u64>) -> Result<BranchData> {
        self.branch_reader(tree, branch)?.read_range(range)
    }

    /// Access the basket cache (e.g. for stats or clearing).
    pub fn basket_cache(&self) -> &BasketCache {
        &self.basket_cache
    }

    /// Replace the basket cache with one using `config`. Cached baskets are dropped.
    pub fn set_cache_config(&mut self, config: CacheConfig) {
        self.basket_cache = BasketCache::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FileHeader {
        FileHeader {
            version: 62800,
            begin: 100,
            end: 5000,
            seek_free: 4900,
            nbytes_free: 60,
            nfree: 1,
            nbytes_name: 58,
            units: 4,
            compress: 101,
            seek_info: 4700,
            nbytes_info: 120,
            uuid: [3u8; 18],
        }
    }

    fn image(h: &FileHeader) -> Vec<u8> {
        let mut w = WBuffer::new();
        h.write(&mut w);
        let mut data = w.into_inner();
        data.resize(h.begin as usize, 0);
        data
    }

    #[test]
    fn header_round_trip() {
        for h in [header(), FileHeader { version: 1_062_800, units: 8, ..header() }] {
            let got = FileHeader::read(&image(&h)).unwrap();
            assert_eq!(got, h);
        }
    }

    #[test]
    fn reject_non_root_file() {
        for bytes in [vec![0u8; 100], b"root".to_vec()] {
            assert!(matches!(RootFile::from_bytes(bytes, "x.root"), Err(RootError::BadMagic)));
        }
    }

    #[test]
    fn missing_top_directory_is_an_error() {
        // the header points past the end of a 100-byte file
        let err = RootFile::from_bytes(image(&header()), "x.root").err().unwrap();
        assert!(matches!(err, RootError::Deserialization(_)), "{}", err);
    }

    #[test]
    fn payload_bounds_are_checked() {
        let mut key = Key::new("TTree", "t", "", 1, 100);
        key.seek_key = 90;
        key.n_bytes = 40;
        assert!(matches!(
            read_key_payload(&[0u8; 100], &key),
            Err(RootError::BufferUnderflow { .. })
        ));
    }

    #[test]
    fn uncompressed_payload_is_returned_verbatim() {
        let mut key = Key::new("TNamed", "n", "", 1, 100);
        key.seek_key = 0;
        key.obj_len = 3;
        key.n_bytes = key.key_len as u32 + 3;
        let mut w = WBuffer::new();
        key.write(&mut w);
        w.write_bytes(&[7, 8, 9]);
        assert_eq!(read_key_payload(w.as_slice(), &key).unwrap(), vec![7, 8, 9]);
    }
}
