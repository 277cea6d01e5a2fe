//! Basket (compressed data block) reading and writing for TTree branches.

use crate::compress::{Compression, compress};
use crate::decompress::decompress;
use crate::error::{Result, RootError};
use crate::key::Key;
use crate::rbuffer::RBuffer;
use crate::wbuffer::WBuffer;

/// TBasket class version.
const TBASKET_VERSION: u16 = 3;
/// Bytes the TBasket fields add after the TKey header.
const TBASKET_HEADER_LEN: usize = 2 + 4 * 4 + 1;

/// The TBasket fields stored right after a basket's TKey header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketHeader {
    /// Class version.
    pub version: u16,
    /// Size of the in-memory buffer.
    pub buffer_size: i32,
    /// Fixed entry size, or the maximum number of entries when offsets are used.
    pub nev_buf_size: i32,
    /// Number of entries in the basket.
    pub nev_buf: i32,
    /// Key length plus data length, excluding entry offsets.
    pub last: i32,
}

/// Read and decompress a single basket from the file.
///
/// Returns the TBasket header and the decompressed payload (big-endian
/// values, followed by entry offsets for variable-length branches).
pub fn read_basket(file_data: &[u8], seek: u64) -> Result<(BasketHeader, Vec<u8>)> {
    let pos = seek as usize;
    if pos >= file_data.len() {
        return Err(RootError::BufferUnderflow { offset: pos, need: 1, have: 0 });
    }

    let mut r = RBuffer::new(file_data);
    r.set_pos(pos);
    let key = Key::read(&mut r)?;
    let header = BasketHeader {
        version: r.read_u16()?,
        buffer_size: r.read_i32()?,
        nev_buf_size: r.read_i32()?,
        nev_buf: r.read_i32()?,
        last: r.read_i32()?,
    };
    let _flag = r.read_u8()?;

    let key_end = pos + key.n_bytes as usize;
    if key_end > file_data.len() || (key.key_len as u32) > key.n_bytes {
        return Err(RootError::BufferUnderflow {
            offset: pos,
            need: key.n_bytes as usize,
            have: file_data.len() - pos,
        });
    }

    let stored = &file_data[pos + key.key_len as usize..key_end];
    let payload = if key.is_compressed() {
        decompress(stored, key.obj_len as usize)?
    } else {
        stored.to_vec()
    };

    log::trace!(
        "basket {} @{}: {} entries, {} -> {} bytes",
        key.name,
        pos,
        header.nev_buf,
        stored.len(),
        payload.len()
    );
    Ok((header, payload))
}

/// The leading `entries * elem_size` value bytes of a flat-branch basket payload.
pub fn basket_values(payload: &[u8], entries: usize, elem_size: usize) -> Result<&[u8]> {
    let need = entries * elem_size;
    if need > payload.len() {
        return Err(RootError::Deserialization(format!(
            "basket holds {} bytes, {} entries of {} bytes expected",
            payload.len(),
            entries,
            elem_size
        )));
    }
    Ok(&payload[..need])
}

/// Where a written basket landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasketPlacement {
    /// File position of the basket key.
    pub seek: u64,
    /// Stored record size (key header included).
    pub n_bytes: u32,
    /// Uncompressed record size (key header included).
    pub tot_bytes: u32,
}

/// Appends baskets of one tree to a file image.
#[derive(Debug, Clone, Copy)]
pub struct BasketWriter<'a> {
    /// Tree name, stored as each basket key's title.
    pub tree: &'a str,
    /// Compression applied to basket payloads.
    pub compression: Compression,
    /// Seek of the directory holding the tree.
    pub seek_pdir: u64,
}

impl BasketWriter<'_> {
    /// Append one basket of `branch` holding `data` (big-endian values of
    /// `elem_size` bytes each) at the end of `file`.
    pub fn write(
        &self,
        file: &mut Vec<u8>,
        branch: &str,
        data: &[u8],
        elem_size: usize,
    ) -> Result<BasketPlacement> {
        if elem_size == 0 || data.len() % elem_size != 0 {
            return Err(RootError::Write(format!(
                "basket of {} bytes is not a whole number of {}-byte values",
                data.len(),
                elem_size
            )));
        }

        let mut key = Key::new("TBasket", branch, self.tree, 1, self.seek_pdir);
        key.key_len = (key.header_len() + TBASKET_HEADER_LEN) as u16;
        key.seek_key = file.len() as u64;

        let stored = compress(data, self.compression)?;
        key.obj_len = data.len() as u32;
        key.n_bytes = key.key_len as u32 + stored.len() as u32;
        let last = key.key_len as i32 + data.len() as i32;

        let mut w = WBuffer::new();
        key.write(&mut w);
        w.write_u16(TBASKET_VERSION);
        w.write_i32(last); // fBufferSize
        w.write_i32(elem_size as i32); // fNevBufSize
        w.write_i32((data.len() / elem_size) as i32); // fNevBuf
        w.write_i32(last); // fLast
        w.write_u8(0); // flag
        debug_assert_eq!(w.pos(), key.key_len as usize);

        file.extend_from_slice(w.as_slice());
        file.extend_from_slice(&stored);

        Ok(BasketPlacement {
            seek: key.seek_key,
            n_bytes: key.n_bytes,
            tot_bytes: key.key_len as u32 + key.obj_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::Algorithm;

    fn values(n: usize) -> Vec<u8> {
        (0..n).flat_map(|i| ((i % 13) as f64).to_be_bytes()).collect()
    }

    #[test]
    fn written_basket_reads_back() {
        let settings =
            [Compression::none(), Compression::default(), Compression::new(Algorithm::Zstd, 3)];
        for compression in settings {
            let mut file = vec![0u8; 100];
            let writer = BasketWriter { tree: "events", compression, seek_pdir: 100 };
            let data = values(1000);
            let placed = writer.write(&mut file, "px", &data, 8).unwrap();
            assert_eq!(placed.seek, 100);
            assert_eq!(file.len() as u64, placed.seek + placed.n_bytes as u64);

            let (header, payload) = read_basket(&file, placed.seek).unwrap();
            assert_eq!(header.nev_buf, 1000);
            assert_eq!(header.nev_buf_size, 8);
            assert_eq!(header.last as u32, placed.tot_bytes);
            assert_eq!(basket_values(&payload, 1000, 8).unwrap(), &data[..]);
        }
    }

    #[test]
    fn ragged_data_is_rejected() {
        let writer = BasketWriter { tree: "t", compression: Compression::none(), seek_pdir: 100 };
        assert!(writer.write(&mut Vec::new(), "b", &[1, 2, 3], 2).is_err());
    }

    #[test]
    fn short_payload_is_rejected() {
        assert!(basket_values(&[0u8; 8], 3, 4).is_err());
        assert_eq!(basket_values(&[0u8; 16], 3, 4).unwrap().len(), 12);
    }

    #[test]
    fn seek_past_end_is_rejected() {
        assert!(matches!(read_basket(&[0u8; 10], 10), Err(RootError::BufferUnderflow { .. })));
    }
}
