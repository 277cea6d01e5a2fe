//! Typed column storage for branch values.

use std::ops::Range;

use crate::error::{Result, RootError};
use crate::tree::LeafType;

/// Values of one flat branch, one vector per leaf type.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchData {
    /// `TLeafO`
    Bool(Vec<bool>),
    /// `TLeafB`
    I8(Vec<i8>),
    /// `TLeafB` (unsigned)
    U8(Vec<u8>),
    /// `TLeafS`
    I16(Vec<i16>),
    /// `TLeafS` (unsigned)
    U16(Vec<u16>),
    /// `TLeafI`
    I32(Vec<i32>),
    /// `TLeafI` (unsigned)
    U32(Vec<u32>),
    /// `TLeafL`
    I64(Vec<i64>),
    /// `TLeafL` (unsigned)
    U64(Vec<u64>),
    /// `TLeafF`
    F32(Vec<f32>),
    /// `TLeafD`
    F64(Vec<f64>),
}

/// Apply `$body` to the inner vector of any variant, binding it to `$v`.
macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            BranchData::Bool($v) => $body,
            BranchData::I8($v) => $body,
            BranchData::U8($v) => $body,
            BranchData::I16($v) => $body,
            BranchData::U16($v) => $body,
            BranchData::I32($v) => $body,
            BranchData::U32($v) => $body,
            BranchData::I64($v) => $body,
            BranchData::U64($v) => $body,
            BranchData::F32($v) => $body,
            BranchData::F64($v) => $body,
        }
    };
}

/// Same as [`each_variant`], but rebuilds a value of the same variant.
macro_rules! map_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            BranchData::Bool($v) => BranchData::Bool($body),
            BranchData::I8($v) => BranchData::I8($body),
            BranchData::U8($v) => BranchData::U8($body),
            BranchData::I16($v) => BranchData::I16($body),
            BranchData::U16($v) => BranchData::U16($body),
            BranchData::I32($v) => BranchData::I32($body),
            BranchData::U32($v) => BranchData::U32($body),
            BranchData::I64($v) => BranchData::I64($body),
            BranchData::U64($v) => BranchData::U64($body),
            BranchData::F32($v) => BranchData::F32($body),
            BranchData::F64($v) => BranchData::F64($body),
        }
    };
}

macro_rules! impl_from_vec {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$t>> for BranchData {
                fn from(v: Vec<$t>) -> Self {
                    BranchData::$variant(v)
                }
            }
        )*
    };
}

impl_from_vec!(
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

impl BranchData {
    /// An empty column of the given type with room for `capacity` values.
    pub fn with_capacity(leaf_type: LeafType, capacity: usize) -> Self {
        match leaf_type {
            LeafType::Bool => BranchData::Bool(Vec::with_capacity(capacity)),
            LeafType::I8 => BranchData::I8(Vec::with_capacity(capacity)),
            LeafType::U8 => BranchData::U8(Vec::with_capacity(capacity)),
            LeafType::I16 => BranchData::I16(Vec::with_capacity(capacity)),
            LeafType::U16 => BranchData::U16(Vec::with_capacity(capacity)),
            LeafType::I32 => BranchData::I32(Vec::with_capacity(capacity)),
            LeafType::U32 => BranchData::U32(Vec::with_capacity(capacity)),
            LeafType::I64 => BranchData::I64(Vec::with_capacity(capacity)),
            LeafType::U64 => BranchData::U64(Vec::with_capacity(capacity)),
            LeafType::F32 => BranchData::F32(Vec::with_capacity(capacity)),
            LeafType::F64 => BranchData::F64(Vec::with_capacity(capacity)),
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    /// Whether the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leaf type of the stored values.
    pub fn leaf_type(&self) -> LeafType {
        match self {
            BranchData::Bool(_) => LeafType::Bool,
            BranchData::I8(_) => LeafType::I8,
            BranchData::U8(_) => LeafType::U8,
            BranchData::I16(_) => LeafType::I16,
            BranchData::U16(_) => LeafType::U16,
            BranchData::I32(_) => LeafType::I32,
            BranchData::U32(_) => LeafType::U32,
            BranchData::I64(_) => LeafType::I64,
            BranchData::U64(_) => LeafType::U64,
            BranchData::F32(_) => LeafType::F32,
            BranchData::F64(_) => LeafType::F64,
        }
    }

    /// Value at `i` widened to f64 (booleans become 0.0/1.0).
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            BranchData::Bool(v) => v.get(i).map(|&b| if b { 1.0 } else { 0.0 }),
            BranchData::I8(v) => v.get(i).map(|&x| x as f64),
            BranchData::U8(v) => v.get(i).map(|&x| x as f64),
            BranchData::I16(v) => v.get(i).map(|&x| x as f64),
            BranchData::U16(v) => v.get(i).map(|&x| x as f64),
            BranchData::I32(v) => v.get(i).map(|&x| x as f64),
            BranchData::U32(v) => v.get(i).map(|&x| x as f64),
            BranchData::I64(v) => v.get(i).map(|&x| x as f64),
            BranchData::U64(v) => v.get(i).map(|&x| x as f64),
            BranchData::F32(v) => v.get(i).map(|&x| x as f64),
            BranchData::F64(v) => v.get(i).copied(),
        }
    }

    /// Lossy f64 view of the whole column, for expression evaluation.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            BranchData::F64(v) => v.clone(),
            _ => (0..self.len()).filter_map(|i| self.get_f64(i)).collect(),
        }
    }

    /// Keep the values whose mask entry is `true`.
    ///
    /// Mask entries beyond the column length are ignored; values beyond the
    /// mask length are dropped.
    pub fn filter(&self, mask: &[bool]) -> BranchData {
        map_variant!(self, v => {
            v.iter().zip(mask).filter(|(_, keep)| **keep).map(|(x, _)| *x).collect()
        })
    }

    /// Copy out the values in `range` (clamped to the column length).
    pub fn slice(&self, range: Range<usize>) -> BranchData {
        let len = self.len();
        let start = range.start.min(len);
        let end = range.end.clamp(start, len);
        map_variant!(self, v => v[start..end].to_vec())
    }

    /// Append the values of `other`, which must have the same type.
    pub fn extend(&mut self, other: &BranchData) -> Result<()> {
        macro_rules! append {
            ($($variant:ident),*) => {
                match (&mut *self, other) {
                    $((BranchData::$variant(a), BranchData::$variant(b)) => {
                        a.extend_from_slice(b);
                        Ok(())
                    })*
                    (a, b) => Err(RootError::TypeMismatch(format!(
                        "cannot append {} values to a {} column",
                        b.leaf_type(),
                        a.leaf_type()
                    ))),
                }
            };
        }
        append!(Bool, I8, U8, I16, U16, I32, U32, I64, U64, F32, F64)
    }

    /// Big-endian encoding of all values (booleans as one byte).
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.leaf_type().byte_size());
        match self {
            BranchData::Bool(v) => out.extend(v.iter().map(|&b| u8::from(b))),
            BranchData::I8(v) => out.extend(v.iter().map(|&x| x as u8)),
            BranchData::U8(v) => out.extend_from_slice(v),
            BranchData::I16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::U16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::U32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::U64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            BranchData::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
        }
        out
    }

    /// Decode big-endian values of `leaf_type`.
    pub fn from_be_bytes(leaf_type: LeafType, bytes: &[u8]) -> Result<Self> {
        let mut data = Self::with_capacity(leaf_type, bytes.len() / leaf_type.byte_size());
        data.decode_append(bytes)?;
        Ok(data)
    }

    /// Decode big-endian values and append them to this column.
    pub fn decode_append(&mut self, bytes: &[u8]) -> Result<()> {
        let size = self.leaf_type().byte_size();
        if bytes.len() % size != 0 {
            return Err(RootError::Deserialization(format!(
                "{} bytes is not a whole number of {} values",
                bytes.len(),
                self.leaf_type()
            )));
        }

        macro_rules! decode {
            ($v:ident, $t:ty) => {
                $v.extend(
                    bytes
                        .chunks_exact(std::mem::size_of::<$t>())
                        .map(|c| <$t>::from_be_bytes(c.try_into().unwrap_or_default())),
                )
            };
        }

        match self {
            BranchData::Bool(v) => v.extend(bytes.iter().map(|&b| b != 0)),
            BranchData::I8(v) => v.extend(bytes.iter().map(|&b| b as i8)),
            BranchData::U8(v) => v.extend_from_slice(bytes),
            BranchData::I16(v) => decode!(v, i16),
            BranchData::U16(v) => decode!(v, u16),
            BranchData::I32(v) => decode!(v, i32),
            BranchData::U32(v) => decode!(v, u32),
            BranchData::I64(v) => decode!(v, i64),
            BranchData::U64(v) => decode!(v, u64),
            BranchData::F32(v) => decode!(v, f32),
            BranchData::F64(v) => decode!(v, f64),
        }
        Ok(())
    }

    /// Value at `i` formatted for text output.
    pub fn format_value(&self, i: usize) -> Option<String> {
        each_variant!(self, v => v.get(i).map(|x| x.to_string()))
    }
}
