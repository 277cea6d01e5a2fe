//! Writing trees of flat branches into new or existing ROOT files.
//!
//! The whole file image is built in memory and replaces the target on
//! [`RootWriter::finish`]. Records are laid out as
//!
//! ```text
//! header | TFile key + directory | baskets | TTree | ... | key list | StreamerInfo | free
//! ```
//!
//! In update mode the existing image is kept up to its `fEND` and its
//! StreamerInfo record stays referenced; the previous key list and free
//! segments stay behind as unreferenced bytes.

use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::basket::BasketWriter;
use crate::compress::{Compression, compress};
use crate::data::BranchData;
use crate::directory::{DIRECTORY_RECORD_LEN, DIRECTORY_VERSION_SMALL, Directory, DirectoryHeader};
use crate::error::{Result, RootError};
use crate::file::{FileHeader, read_top_directory_header};
use crate::key::{Key, datime_now, string_len};
use crate::objects::{BranchLayout, TreeLayout, write_ttree};
use crate::rbuffer::RBuffer;
use crate::wbuffer::WBuffer;

/// `fVersion` stamped into new files (ROOT 6.28/00).
pub const WRITER_VERSION: u32 = 62800;
/// Offset of the first record in new files.
const BEGIN: u64 = 100;
/// Default target size of one basket in bytes.
pub const DEFAULT_BASKET_SIZE: usize = 32000;
/// TList class version of the StreamerInfo record.
const TLIST_VERSION: u16 = 5;
/// End of the single free segment ROOT records for small files.
const FREE_SEGMENT_END: u32 = 2_000_000_000;

/// How [`RootWriter::create`] treats an existing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Start an empty file, replacing any existing one.
    #[default]
    Recreate,
    /// Append to an existing file, creating it when missing.
    Update,
    /// Start an empty file; fail if the path exists.
    Create,
}

/// A tree to be written: named columns of equal length.
#[derive(Debug, Clone)]
pub struct TreeSpec<'a> {
    /// Tree (key) name.
    pub name: String,
    /// Tree title.
    pub title: String,
    /// Branch names and values, in output order.
    pub branches: Vec<(String, &'a BranchData)>,
    /// Compression of baskets and of the tree record.
    pub compression: Compression,
    /// Target basket size in bytes; each basket holds at least one entry.
    pub basket_size: usize,
}

impl<'a> TreeSpec<'a> {
    /// An empty tree with default compression and basket size.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            branches: Vec::new(),
            compression: Compression::default(),
            basket_size: DEFAULT_BASKET_SIZE,
        }
    }

    /// Append a branch.
    pub fn branch(mut self, name: impl Into<String>, data: &'a BranchData) -> Self {
        self.branches.push((name.into(), data));
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the target basket size.
    pub fn with_basket_size(mut self, basket_size: usize) -> Self {
        self.basket_size = basket_size;
        self
    }

    /// Check names and lengths; returns the entry count.
    fn validate(&self) -> Result<u64> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(RootError::Write(format!("invalid tree name '{}'", self.name)));
        }
        let mut seen = HashSet::new();
        let mut entries: Option<usize> = None;
        for (name, data) in &self.branches {
            if name.is_empty() {
                return Err(RootError::Write("branch names must not be empty".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(RootError::Write(format!("duplicate branch name '{}'", name)));
            }
            match entries {
                None => entries = Some(data.len()),
                Some(n) if n != data.len() => {
                    return Err(RootError::Write(format!(
                        "branch '{}' has {} entries, expected {}",
                        name,
                        data.len(),
                        n
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(entries.unwrap_or(0) as u64)
    }
}

/// Builds a ROOT file image and writes it out on [`finish`](Self::finish).
///
/// Dropping a writer without finishing leaves the target untouched.
pub struct RootWriter {
    path: PathBuf,
    buf: Vec<u8>,
    header: FileHeader,
    dir: DirectoryHeader,
    /// Name and title shared by the `TFile` key and the key-list record.
    file_name: String,
    file_title: String,
    keys: Vec<Key>,
}

impl RootWriter {
    /// Open `path` for writing according to `mode`.
    pub fn create(path: impl AsRef<Path>, mode: WriteMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();
        match mode {
            WriteMode::Create if exists => Err(RootError::Io(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ))),
            WriteMode::Update if exists => Self::load(path),
            _ => Ok(Self::fresh(path)),
        }
    }

    fn fresh(path: PathBuf) -> Self {
        let file_name =
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let file_title = String::new();
        let now = datime_now();
        let uuid = new_uuid();

        let mut file_key = Key::new("TFile", &file_name, &file_title, 1, 0);
        file_key.seek_key = BEGIN;
        let nbytes_name =
            (file_key.key_len as usize + string_len(&file_name) + string_len(&file_title)) as u32;
        file_key.obj_len = nbytes_name - file_key.key_len as u32 + DIRECTORY_RECORD_LEN as u32;
        file_key.n_bytes = file_key.key_len as u32 + file_key.obj_len;

        let dir = DirectoryHeader {
            version: DIRECTORY_VERSION_SMALL,
            datime_c: now,
            datime_m: now,
            nbytes_keys: 0,
            nbytes_name,
            seek_dir: BEGIN,
            seek_parent: 0,
            seek_keys: 0,
            uuid,
        };
        let header = FileHeader {
            version: WRITER_VERSION,
            begin: BEGIN,
            end: 0,
            seek_free: 0,
            nbytes_free: 0,
            nfree: 0,
            nbytes_name,
            units: 4,
            compress: Compression::default().setting(),
            seek_info: 0,
            nbytes_info: 0,
            uuid,
        };

        let mut w = WBuffer::new();
        file_key.write(&mut w);
        w.write_string(&file_name);
        w.write_string(&file_title);
        dir.write(&mut w);

        let mut buf = vec![0u8; BEGIN as usize];
        buf.extend_from_slice(w.as_slice());
        log::info!("creating {}", path.display());
        Self { path, buf, header, dir, file_name, file_title, keys: Vec::new() }
    }

    fn load(path: PathBuf) -> Result<Self> {
        let mut buf = fs::read(&path)?;
        let header = FileHeader::read(&buf)?;
        let dir = read_top_directory_header(&buf, &header)?;
        if header.is_large() || dir.is_large() {
            return Err(RootError::Write(format!(
                "{} uses 64-bit seeks; appending is only supported for small files",
                path.display()
            )));
        }
        if header.end > buf.len() as u64 || header.end < header.begin {
            return Err(RootError::Deserialization(format!(
                "fEND {} does not fit a {}-byte file",
                header.end,
                buf.len()
            )));
        }

        let mut r = RBuffer::new(&buf);
        r.set_pos(header.begin as usize);
        let file_key = Key::read(&mut r)?;
        let keys = Directory::read_key_list(&buf, dir.seek_keys)?.keys().to_vec();
        buf.truncate(header.end as usize);

        log::info!("updating {} ({} keys)", path.display(), keys.len());
        Ok(Self {
            path,
            buf,
            header,
            dir,
            file_name: file_key.name,
            file_title: file_key.title,
            keys,
        })
    }

    /// Target path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys of the top directory, including those written so far.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Write a tree. A name already present in the directory gets the next cycle.
    pub fn write_tree(&mut self, spec: &TreeSpec<'_>) -> Result<()> {
        let entries = spec.validate()?;
        let cycle = self
            .keys
            .iter()
            .filter(|k| k.name == spec.name)
            .map(|k| k.cycle)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| RootError::Write(format!("no cycles left for '{}'", spec.name)))?;

        let baskets = BasketWriter {
            tree: &spec.name,
            compression: spec.compression,
            seek_pdir: self.header.begin,
        };
        let mut branches = Vec::with_capacity(spec.branches.len());
        for (name, data) in &spec.branches {
            let leaf_type = data.leaf_type();
            let elem = leaf_type.byte_size();
            let per_basket = (spec.basket_size / elem).max(1);
            let bytes = data.to_be_bytes();

            let mut layout = BranchLayout {
                name: name.clone(),
                leaf_type,
                compress: spec.compression.setting(),
                basket_size: i32::try_from(spec.basket_size).unwrap_or(i32::MAX),
                entries,
                basket_bytes: Vec::new(),
                basket_entry: Vec::new(),
                basket_seek: Vec::new(),
                tot_bytes: 0,
                zip_bytes: 0,
            };
            for (i, chunk) in bytes.chunks(per_basket * elem).enumerate() {
                let placed = baskets.write(&mut self.buf, name, chunk, elem)?;
                self.check_size()?;
                layout.basket_entry.push((i * per_basket) as u64);
                layout.basket_seek.push(placed.seek);
                layout.basket_bytes.push(placed.n_bytes);
                layout.tot_bytes += placed.tot_bytes as i64;
                layout.zip_bytes += placed.n_bytes as i64;
            }
            branches.push(layout);
        }

        let n_branches = branches.len();
        let layout =
            TreeLayout { name: spec.name.clone(), title: spec.title.clone(), entries, branches };
        let key = Key::new("TTree", &spec.name, &spec.title, cycle, self.header.begin);
        let mut w = WBuffer::with_displacement(key.key_len as u32);
        write_ttree(&mut w, &layout);
        let key = self.append_record(key, w.as_slice(), spec.compression)?;

        log::info!(
            "wrote tree {};{} ({} entries, {} branches) to {}",
            spec.name,
            cycle,
            entries,
            n_branches,
            self.path.display()
        );
        self.keys.push(key);
        Ok(())
    }

    /// Write the trailer records, patch the header and top directory, and
    /// atomically replace the target file.
    pub fn finish(mut self) -> Result<()> {
        let begin = self.header.begin;

        let mut list = WBuffer::new();
        list.write_u32(self.keys.len() as u32);
        for key in &self.keys {
            key.write(&mut list);
        }
        let list_key = Key::new("TFile", &self.file_name, &self.file_title, 1, begin);
        let list_key = self.append_record(list_key, list.as_slice(), Compression::none())?;
        self.dir.seek_keys = list_key.seek_key;
        self.dir.nbytes_keys = list_key.n_bytes;

        // an updated file keeps the StreamerInfo it already has
        if self.header.seek_info == 0 {
            self.write_streamer_info()?;
        }

        let free_key = Key::new("TFile", &self.file_name, &self.file_title, 1, begin);
        let free_payload_len = 10;
        let first_free = self.buf.len() + free_key.key_len as usize + free_payload_len;
        let mut free = WBuffer::new();
        free.write_u16(1);
        free.write_u32(first_free as u32);
        free.write_u32(FREE_SEGMENT_END);
        let free_key = self.append_record(free_key, free.as_slice(), Compression::none())?;
        self.header.seek_free = free_key.seek_key;
        self.header.nbytes_free = free_key.n_bytes;
        self.header.nfree = 1;
        self.header.end = self.buf.len() as u64;

        self.dir.datime_m = datime_now();
        let mut w = WBuffer::new();
        self.header.write(&mut w);
        self.patch(0, w.as_slice())?;
        let mut w = WBuffer::new();
        self.dir.write(&mut w);
        self.patch((begin + self.header.nbytes_name as u64) as usize, w.as_slice())?;

        let tmp = temp_path(&self.path);
        fs::write(&tmp, &self.buf)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::info!(
            "finished {} ({} bytes, {} keys)",
            self.path.display(),
            self.buf.len(),
            self.keys.len()
        );
        Ok(())
    }

    /// Append an empty StreamerInfo list and point the header at it.
    fn write_streamer_info(&mut self) -> Result<()> {
        let info_key =
            Key::new("TList", "StreamerInfo", "Doubly linked list", 1, self.header.begin);
        let mut info = WBuffer::with_displacement(info_key.key_len as u32);
        let start = info.begin_versioned(TLIST_VERSION);
        info.write_tobject();
        info.write_string("");
        info.write_i32(0); // no classes
        info.end_versioned(start);
        let compression = Compression::from_setting(self.header.compress).unwrap_or_default();
        let info_key = self.append_record(info_key, info.as_slice(), compression)?;
        self.header.seek_info = info_key.seek_key;
        self.header.nbytes_info = info_key.n_bytes;
        Ok(())
    }

    /// Append a key record holding `payload`; fills in the key's sizes and seek.
    fn append_record(
        &mut self,
        mut key: Key,
        payload: &[u8],
        compression: Compression,
    ) -> Result<Key> {
        let stored = compress(payload, compression)?;
        key.seek_key = self.buf.len() as u64;
        key.obj_len = payload.len() as u32;
        key.n_bytes = key.key_len as u32 + stored.len() as u32;

        let mut w = WBuffer::new();
        key.write(&mut w);
        self.buf.extend_from_slice(w.as_slice());
        self.buf.extend_from_slice(&stored);
        self.check_size()?;
        Ok(key)
    }

    fn patch(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        let dst = self.buf.get_mut(at..at + bytes.len()).ok_or_else(|| {
            RootError::Write(format!("record at {} does not fit the file image", at))
        })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn check_size(&self) -> Result<()> {
        let len = self.buf.len() as u64;
        if len > i32::MAX as u64 {
            return Err(RootError::FileTooLarge(len));
        }
        Ok(())
    }
}

/// Sibling path the image is written to before being renamed over `path`.
fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

fn new_uuid() -> [u8; 18] {
    let mut uuid = [0u8; 18];
    uuid[1] = 1; // UUID version, u16
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    uuid[2..10].copy_from_slice(&nanos.to_be_bytes());
    uuid[10..14].copy_from_slice(&std::process::id().to_be_bytes());
    uuid
}
