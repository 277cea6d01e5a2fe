//! Public types for TTree branch metadata.

use std::fmt;

/// Leaf data type (maps to ROOT TLeaf class names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafType {
    /// `TLeafO`: boolean (1 byte).
    Bool,
    /// `TLeafB`: 8-bit signed integer.
    I8,
    /// `TLeafB` unsigned variant.
    U8,
    /// `TLeafS`: 16-bit signed integer.
    I16,
    /// `TLeafS` unsigned variant.
    U16,
    /// `TLeafI`: 32-bit signed integer.
    I32,
    /// `TLeafI` unsigned variant.
    U32,
    /// `TLeafL`: 64-bit signed integer.
    I64,
    /// `TLeafL` unsigned variant.
    U64,
    /// `TLeafF`: 32-bit float.
    F32,
    /// `TLeafD`: 64-bit float.
    F64,
}

impl LeafType {
    /// All leaf types, in leaf-code order.
    pub const ALL: [LeafType; 11] = [
        LeafType::Bool,
        LeafType::I8,
        LeafType::U8,
        LeafType::I16,
        LeafType::U16,
        LeafType::I32,
        LeafType::U32,
        LeafType::I64,
        LeafType::U64,
        LeafType::F32,
        LeafType::F64,
    ];

    /// Size in bytes of one element.
    pub fn byte_size(self) -> usize {
        match self {
            LeafType::Bool | LeafType::I8 | LeafType::U8 => 1,
            LeafType::I16 | LeafType::U16 => 2,
            LeafType::F32 | LeafType::I32 | LeafType::U32 => 4,
            LeafType::F64 | LeafType::I64 | LeafType::U64 => 8,
        }
    }

    /// Type code used in a branch's leaf list (`"x/D"`).
    pub fn code(self) -> char {
        match self {
            LeafType::Bool => 'O',
            LeafType::I8 => 'B',
            LeafType::U8 => 'b',
            LeafType::I16 => 'S',
            LeafType::U16 => 's',
            LeafType::I32 => 'I',
            LeafType::U32 => 'i',
            LeafType::I64 => 'L',
            LeafType::U64 => 'l',
            LeafType::F32 => 'F',
            LeafType::F64 => 'D',
        }
    }

    /// ROOT leaf class storing this type.
    pub fn class_name(self) -> &'static str {
        match self {
            LeafType::Bool => "TLeafO",
            LeafType::I8 | LeafType::U8 => "TLeafB",
            LeafType::I16 | LeafType::U16 => "TLeafS",
            LeafType::I32 | LeafType::U32 => "TLeafI",
            LeafType::I64 | LeafType::U64 => "TLeafL",
            LeafType::F32 => "TLeafF",
            LeafType::F64 => "TLeafD",
        }
    }

    /// Whether the leaf sets `fIsUnsigned`.
    pub fn is_unsigned(self) -> bool {
        matches!(self, LeafType::U8 | LeafType::U16 | LeafType::U32 | LeafType::U64)
    }

    /// Resolve a leaf class plus its `fIsUnsigned` flag.
    pub fn from_class(class_name: &str, unsigned: bool) -> Option<Self> {
        let lt = match (class_name, unsigned) {
            ("TLeafO", _) => LeafType::Bool,
            ("TLeafB", false) => LeafType::I8,
            ("TLeafB", true) => LeafType::U8,
            ("TLeafS", false) => LeafType::I16,
            ("TLeafS", true) => LeafType::U16,
            ("TLeafI", false) => LeafType::I32,
            ("TLeafI", true) => LeafType::U32,
            ("TLeafL", false) => LeafType::I64,
            ("TLeafL", true) => LeafType::U64,
            ("TLeafF", _) => LeafType::F32,
            ("TLeafD", _) => LeafType::F64,
            _ => return None,
        };
        Some(lt)
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeafType::Bool => "bool",
            LeafType::I8 => "int8",
            LeafType::U8 => "uint8",
            LeafType::I16 => "int16",
            LeafType::U16 => "uint16",
            LeafType::I32 => "int32",
            LeafType::U32 => "uint32",
            LeafType::I64 => "int64",
            LeafType::U64 => "uint64",
            LeafType::F32 => "float32",
            LeafType::F64 => "float64",
        };
        f.write_str(s)
    }
}

/// Metadata for a single TBranch in a TTree.
#[derive(Debug, Clone)]
pub struct BranchInfo {
    /// Branch name.
    pub name: String,
    /// Branch title (leaf list, e.g. `"px/D"`).
    pub title: String,
    /// Streamed class of the branch (`TBranch`, `TBranchElement`, ...).
    pub class_name: String,
    /// Data type of the first leaf; `None` if its class is not a primitive leaf.
    pub leaf_type: Option<LeafType>,
    /// Number of leaves attached to the branch.
    pub n_leaves: usize,
    /// `fLen` of the first leaf (elements per entry for fixed arrays).
    pub leaf_len: i32,
    /// Whether the leaf length comes from another leaf (jagged data).
    pub has_leaf_count: bool,
    /// Total number of entries in this branch.
    pub entries: u64,
    /// `fEntryOffsetLen`; non-zero means baskets carry per-entry offsets.
    pub entry_offset_len: i32,
    /// Compressed byte sizes for each basket.
    pub basket_bytes: Vec<u32>,
    /// Entry boundaries for each basket.
    pub basket_entry: Vec<u64>,
    /// Absolute file offsets (seek positions) for each basket.
    pub basket_seek: Vec<u64>,
    /// Number of valid baskets (`fWriteBasket`).
    pub n_baskets: usize,
}

impl BranchInfo {
    /// A plain `TBranch` holding one primitive value per entry.
    pub fn is_flat(&self) -> bool {
        self.class_name == "TBranch"
            && self.leaf_type.is_some()
            && self.n_leaves == 1
            && self.leaf_len == 1
            && !self.has_leaf_count
            && self.entry_offset_len == 0
    }

    /// Human-readable reason this branch is not flat, if it isn't.
    pub fn unsupported_reason(&self) -> Option<String> {
        if self.class_name != "TBranch" {
            return Some(format!("branch class {} is not supported", self.class_name));
        }
        if self.leaf_type.is_none() {
            return Some("leaf is not a primitive type".to_string());
        }
        if self.n_leaves != 1 {
            return Some(format!("branch has {} leaves", self.n_leaves));
        }
        if self.has_leaf_count || self.entry_offset_len != 0 {
            return Some("variable-length branches are not supported".to_string());
        }
        if self.leaf_len != 1 {
            return Some(format!("fixed-size array of {} elements", self.leaf_len));
        }
        None
    }
}

/// A parsed TTree with branch metadata.
#[derive(Debug, Clone)]
pub struct Tree {
    /// Tree name.
    pub name: String,
    /// Tree title.
    pub title: String,
    /// Total number of entries.
    pub entries: u64,
    /// Flat list of all branches (including sub-branches).
    pub branches: Vec<BranchInfo>,
}

impl Tree {
    /// Find a branch by name.
    pub fn find_branch(&self, name: &str) -> Option<&BranchInfo> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// List all branch names.
    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.name.as_str()).collect()
    }
}
