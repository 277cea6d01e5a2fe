//! Byte storage behind an open ROOT file.

use std::fs::File;
use std::ops::Deref;

use crate::error::Result;

/// File bytes, either read into memory or mapped from disk.
pub enum DataSource {
    /// Bytes owned in a `Vec<u8>` (used by [`RootFile::from_bytes`](crate::RootFile::from_bytes)).
    Owned(Vec<u8>),
    /// Read-only memory map of the file.
    Mmap(memmap2::Mmap),
}

impl DataSource {
    /// Map `file` read-only. Empty files are held as an empty buffer, since
    /// zero-length maps are rejected on some platforms.
    pub fn map(file: &File) -> Result<Self> {
        if file.metadata()?.len() == 0 {
            return Ok(DataSource::Owned(Vec::new()));
        }
        // SAFETY: the map is only read. Concurrent truncation of the file by
        // another process is outside what this reader guards against.
        let mmap = unsafe { memmap2::Mmap::map(file)? };
        Ok(DataSource::Mmap(mmap))
    }
}

impl Deref for DataSource {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            DataSource::Owned(v) => v,
            DataSource::Mmap(m) => m,
        }
    }
}

impl AsRef<[u8]> for DataSource {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}
