//! Binary reader for ROOT's big-endian serialization format.

use crate::error::{Result, RootError};

/// `kByteCountMask`: set on the first word of an object that carries a byte count.
pub const K_BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// A cursor-based reader over a byte slice, using ROOT's big-endian conventions.
pub struct RBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RBuffer<'a> {
    /// Create a new reader over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total length of underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining bytes from current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Set read position absolutely.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read a sub-slice of `n` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let b = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    /// Read a signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a one-byte boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian f32.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian f64.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// Read a ROOT-encoded string.
    ///
    /// Format: length byte (if < 255), or 255 + u32 length, then UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let first = self.read_u8()?;
        let len = if first == 255 { self.read_u32()? as usize } else { first as usize };
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a NUL-terminated C string (used for class names in object tags).
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(RootError::Deserialization(format!(
                "unterminated class name at offset {}",
                self.pos
            )));
        };
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }

    /// Read a ROOT streamer version header.
    ///
    /// Returns `(version, end_pos)` where `end_pos` is the absolute buffer
    /// position where this streamed object ends (`None` if no byte-count header).
    ///
    /// The byte count spans from right after the u32 to the end of the object
    /// (i.e. it includes the version u16).
    pub fn read_version(&mut self) -> Result<(u16, Option<usize>)> {
        let start = self.pos;
        let raw = self.read_u32()?;
        if raw & K_BYTE_COUNT_MASK != 0 {
            let byte_count = (raw & !K_BYTE_COUNT_MASK) as usize;
            let version = self.read_u16()?;
            Ok((version, Some(start + 4 + byte_count)))
        } else {
            // No byte count: the first two bytes are the version.
            let version = (raw >> 16) as u16;
            self.pos -= 2;
            Ok((version, None))
        }
    }

    /// Read a `TObject` header: fUniqueID (u32) + fBits (u32).
    pub fn read_tobject(&mut self) -> Result<(u32, u32)> {
        let _ver = self.read_u16()?;
        let unique_id = self.read_u32()?;
        let bits = self.read_u32()?;
        if bits & 0x0000_0010 != 0 {
            // kIsReferenced: a 2-byte process id follows
            self.skip(2)?;
        }
        Ok((unique_id, bits))
    }

    /// Read a `TNamed`: versioned TObject + fName + fTitle.
    pub fn read_tnamed(&mut self) -> Result<(String, String)> {
        let (_ver, end) = self.read_version()?;
        self.read_tobject()?;
        let name = self.read_string()?;
        let title = self.read_string()?;
        if let Some(end) = end {
            self.set_pos(end);
        }
        Ok((name, title))
    }

    /// Skip a versioned object using its byte count.
    pub fn skip_versioned(&mut self) -> Result<()> {
        let (_ver, end) = self.read_version()?;
        match end {
            Some(end_pos) if end_pos <= self.data.len() => {
                self.set_pos(end_pos);
                Ok(())
            }
            Some(end_pos) => Err(RootError::BufferUnderflow {
                offset: self.pos,
                need: end_pos - self.pos,
                have: self.remaining(),
            }),
            None => Err(RootError::Deserialization(format!(
                "cannot skip object without byte count at offset {}",
                self.pos
            ))),
        }
    }

    // ── internal ────────────────────────────────────────────────

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos.checked_add(n).is_none_or(|end| end > self.data.len()) {
            return Err(RootError::BufferUnderflow {
                offset: self.pos,
                need: n,
                have: self.data.len().saturating_sub(self.pos),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x40, 0x09, 0x21, 0xfb, 0x54, 0x44, 0x2d, 0x18];
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_u32().unwrap(), 0x0102_0304);
        assert!((r.read_f64().unwrap() - std::f64::consts::PI).abs() < 1e-15);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn read_string_short_and_long() {
        let data = [3, b'a', b'b', b'c'];
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_string().unwrap(), "abc");

        let mut long = vec![255u8];
        long.extend_from_slice(&300u32.to_be_bytes());
        long.extend(std::iter::repeat_n(b'x', 300));
        let mut r = RBuffer::new(&long);
        assert_eq!(r.read_string().unwrap().len(), 300);
    }

    #[test]
    fn read_cstring_requires_terminator() {
        let mut r = RBuffer::new(b"TBranch\0rest");
        assert_eq!(r.read_cstring().unwrap(), "TBranch");
        assert_eq!(r.pos(), 8);

        let mut r = RBuffer::new(b"TLeafD");
        assert!(r.read_cstring().is_err());
    }

    #[test]
    fn read_version_with_bytecount() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x4000_0010u32.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 20]);
        let mut r = RBuffer::new(&data);
        let (ver, end) = r.read_version().unwrap();
        assert_eq!(ver, 3);
        assert_eq!(end, Some(20));
    }

    #[test]
    fn read_version_without_bytecount() {
        let data = [0x00, 0x05, 0x00, 0x00];
        let mut r = RBuffer::new(&data);
        let (ver, end) = r.read_version().unwrap();
        assert_eq!(ver, 5);
        assert!(end.is_none());
        assert_eq!(r.pos(), 2);
    }

    #[test]
    fn underflow_reports_position() {
        let mut r = RBuffer::new(&[1, 2]);
        match r.read_u32() {
            Err(RootError::BufferUnderflow { offset, need, have }) => {
                assert_eq!((offset, need, have), (0, 4, 2));
            }
            other => panic!("expected underflow, got {other:?}"),
        }
    }
}
