//! TDirectory records and key-list navigation.

use crate::error::{Result, RootError};
use crate::key::Key;
use crate::rbuffer::RBuffer;
use crate::wbuffer::WBuffer;

/// TDirectoryFile class version for 32-bit seek pointers.
pub const DIRECTORY_VERSION_SMALL: u16 = 5;

/// Serialized size of a small-format directory record, including the
/// 12 bytes ROOT reserves so the record can later be rewritten as large.
pub const DIRECTORY_RECORD_LEN: usize = 60;

/// Size of a stored UUID: a u16 version followed by 16 bytes.
pub const UUID_LEN: usize = 18;

/// The fixed-size `TDirectory` streamer stored at the start of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHeader {
    /// Class version (> 1000 means 64-bit seeks).
    pub version: u16,
    /// Creation time.
    pub datime_c: u32,
    /// Modification time.
    pub datime_m: u32,
    /// Size of the key-list record.
    pub nbytes_keys: u32,
    /// Size of the name record (TKey + TNamed) preceding this header.
    pub nbytes_name: u32,
    /// Seek of this directory's key.
    pub seek_dir: u64,
    /// Seek of the parent directory.
    pub seek_parent: u64,
    /// Seek of the key-list record.
    pub seek_keys: u64,
    /// UUID version + 16 UUID bytes.
    pub uuid: [u8; UUID_LEN],
}

impl DirectoryHeader {
    /// Parse a directory header at the reader's position.
    pub fn read(r: &mut RBuffer) -> Result<Self> {
        let version = r.read_u16()?;
        let datime_c = r.read_u32()?;
        let datime_m = r.read_u32()?;
        let nbytes_keys = r.read_u32()?;
        let nbytes_name = r.read_u32()?;

        let (seek_dir, seek_parent, seek_keys) = if version > 1000 {
            (r.read_u64()?, r.read_u64()?, r.read_u64()?)
        } else {
            (r.read_u32()? as u64, r.read_u32()? as u64, r.read_u32()? as u64)
        };

        let mut uuid = [0u8; UUID_LEN];
        if r.remaining() >= UUID_LEN {
            let raw = r.read_bytes(UUID_LEN)?;
            uuid.copy_from_slice(raw);
        }

        Ok(Self {
            version,
            datime_c,
            datime_m,
            nbytes_keys,
            nbytes_name,
            seek_dir,
            seek_parent,
            seek_keys,
            uuid,
        })
    }

    /// Whether seek pointers are 64-bit.
    pub fn is_large(&self) -> bool {
        self.version > 1000
    }

    /// Serialize the header; small records are padded to [`DIRECTORY_RECORD_LEN`].
    pub fn write(&self, w: &mut WBuffer) {
        let start = w.pos();
        w.write_u16(self.version);
        w.write_u32(self.datime_c);
        w.write_u32(self.datime_m);
        w.write_u32(self.nbytes_keys);
        w.write_u32(self.nbytes_name);
        if self.is_large() {
            w.write_u64(self.seek_dir);
            w.write_u64(self.seek_parent);
            w.write_u64(self.seek_keys);
        } else {
            w.write_u32(self.seek_dir as u32);
            w.write_u32(self.seek_parent as u32);
            w.write_u32(self.seek_keys as u32);
        }
        w.write_bytes(&self.uuid);
        while w.pos() - start < DIRECTORY_RECORD_LEN {
            w.write_u8(0);
        }
    }
}

/// A parsed TDirectory: an ordered list of TKeys.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    keys: Vec<Key>,
}

impl Directory {
    /// Read the key list from the file at `seek_keys`.
    ///
    /// The key list starts with a TKey header for the list itself, then
    /// a u32 `nkeys`, followed by `nkeys` TKey records.
    pub fn read_key_list(file_data: &[u8], seek_keys: u64) -> Result<Self> {
        if seek_keys == 0 {
            return Ok(Directory::default());
        }
        let pos = usize::try_from(seek_keys).map_err(|_| {
            RootError::Deserialization(format!("key list seek {} out of range", seek_keys))
        })?;
        if pos >= file_data.len() {
            return Err(RootError::Deserialization(format!(
                "key list at {} lies past end of file ({} bytes)",
                pos,
                file_data.len()
            )));
        }

        let mut r = RBuffer::new(file_data);
        r.set_pos(pos);

        let _list_key = Key::read(&mut r)?;
        let nkeys = r.read_u32()? as usize;
        // Each key header is at least 26 bytes; reject counts the file cannot hold.
        if nkeys > r.remaining() / 26 {
            return Err(RootError::Deserialization(format!("implausible key count {}", nkeys)));
        }

        let mut keys = Vec::with_capacity(nkeys);
        for _ in 0..nkeys {
            keys.push(Key::read(&mut r)?);
        }

        Ok(Directory { keys })
    }

    /// Read a subdirectory from the decompressed payload of a TDirectoryFile key.
    pub fn read_from_payload(payload: &[u8], file_data: &[u8]) -> Result<Self> {
        let header = DirectoryHeader::read(&mut RBuffer::new(payload))?;
        Self::read_key_list(file_data, header.seek_keys)
    }

    /// Access the list of keys.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Find a key by name (returns the highest cycle).
    pub fn find_key(&self, name: &str) -> Option<&Key> {
        self.keys.iter().filter(|k| k.name == name).max_by_key(|k| k.cycle)
    }

    /// Highest cycle in use for `name`, or 0 if absent.
    pub fn max_cycle(&self, name: &str) -> u16 {
        self.find_key(name).map_or(0, |k| k.cycle)
    }
}

/// Whether a class name denotes a directory.
pub fn is_directory_class(class_name: &str) -> bool {
    matches!(class_name, "TDirectoryFile" | "TDirectory")
}
