//! TKey parsing and serialization: the record header used by ROOT to locate objects.

use chrono::{Datelike, Timelike};

use crate::error::Result;
use crate::rbuffer::RBuffer;
use crate::wbuffer::WBuffer;

/// TKey class version for 32-bit seek pointers.
pub const KEY_VERSION_SMALL: u16 = 4;
/// Key versions above this use 64-bit seek pointers.
const KEY_LARGE_THRESHOLD: u16 = 1000;

/// A parsed TKey record.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    /// Total number of bytes in compressed object + key header.
    pub n_bytes: u32,
    /// Version of key class.
    pub version: u16,
    /// Uncompressed object length.
    pub obj_len: u32,
    /// Key creation time (ROOT datime).
    pub datime: u32,
    /// Length of the key header itself.
    pub key_len: u16,
    /// Cycle number (ROOT versioning within a directory).
    pub cycle: u16,
    /// Absolute position of this key in the file.
    pub seek_key: u64,
    /// Parent directory seek position.
    pub seek_pdir: u64,
    /// Class name of the stored object.
    pub class_name: String,
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

/// Public info about a key (for `list_keys()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Object name.
    pub name: String,
    /// Object class name (e.g. "TTree", "TDirectoryFile").
    pub class_name: String,
    /// Cycle number.
    pub cycle: u16,
}

impl KeyInfo {
    /// Create from an internal Key.
    pub fn from_key(key: &Key) -> Self {
        Self { name: key.name.clone(), class_name: key.class_name.clone(), cycle: key.cycle }
    }
}

impl Key {
    /// Read a TKey from the buffer at the current position.
    ///
    /// Seek pointers are 64-bit when the key version exceeds 1000.
    pub fn read(r: &mut RBuffer) -> Result<Self> {
        let n_bytes = r.read_u32()?;
        let version = r.read_u16()?;
        let obj_len = r.read_u32()?;
        let datime = r.read_u32()?;
        let key_len = r.read_u16()?;
        let cycle = r.read_u16()?;

        let (seek_key, seek_pdir) = if version > KEY_LARGE_THRESHOLD {
            (r.read_u64()?, r.read_u64()?)
        } else {
            (r.read_u32()? as u64, r.read_u32()? as u64)
        };

        let class_name = r.read_string()?;
        let name = r.read_string()?;
        let title = r.read_string()?;

        Ok(Key {
            n_bytes,
            version,
            obj_len,
            datime,
            key_len,
            cycle,
            seek_key,
            seek_pdir,
            class_name,
            name,
            title,
        })
    }

    /// Build a small-format key whose sizes are filled in later.
    pub fn new(class_name: &str, name: &str, title: &str, cycle: u16, seek_pdir: u64) -> Self {
        let mut key = Key {
            n_bytes: 0,
            version: KEY_VERSION_SMALL,
            obj_len: 0,
            datime: datime_now(),
            key_len: 0,
            cycle,
            seek_key: 0,
            seek_pdir,
            class_name: class_name.to_string(),
            name: name.to_string(),
            title: title.to_string(),
        };
        key.key_len = key.header_len() as u16;
        key
    }

    /// Whether this key stores 64-bit seek pointers.
    pub fn is_large(&self) -> bool {
        self.version > KEY_LARGE_THRESHOLD
    }

    /// Serialized length of this key header.
    pub fn header_len(&self) -> usize {
        let seeks = if self.is_large() { 16 } else { 8 };
        18 + seeks
            + string_len(&self.class_name)
            + string_len(&self.name)
            + string_len(&self.title)
    }

    /// Serialize the key header.
    pub fn write(&self, w: &mut WBuffer) {
        w.write_u32(self.n_bytes);
        w.write_u16(self.version);
        w.write_u32(self.obj_len);
        w.write_u32(self.datime);
        w.write_u16(self.key_len);
        w.write_u16(self.cycle);
        if self.is_large() {
            w.write_u64(self.seek_key);
            w.write_u64(self.seek_pdir);
        } else {
            w.write_u32(self.seek_key as u32);
            w.write_u32(self.seek_pdir as u32);
        }
        w.write_string(&self.class_name);
        w.write_string(&self.name);
        w.write_string(&self.title);
    }

    /// Whether the stored payload is compressed.
    pub fn is_compressed(&self) -> bool {
        self.obj_len != self.n_bytes.saturating_sub(self.key_len as u32)
    }
}

/// Serialized length of a ROOT string.
pub fn string_len(s: &str) -> usize {
    if s.len() < 255 { 1 + s.len() } else { 5 + s.len() }
}

/// Current local time in ROOT's packed `TDatime` encoding.
pub fn datime_now() -> u32 {
    let now = chrono::Local::now();
    encode_datime(now.year(), now.month(), now.day(), now.hour(), now.minute(), now.second())
}

/// Pack a calendar time into `TDatime` (years counted from 1995).
pub fn encode_datime(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> u32 {
    let year = (year - 1995).clamp(0, 63) as u32;
    (year << 26) | (month << 22) | (day << 17) | (hour << 12) | (min << 6) | sec
}
