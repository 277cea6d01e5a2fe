//! TTree and TBranch binary (de)serialization in ROOT streamer format.

use std::collections::HashMap;

use crate::error::{Result, RootError};
use crate::rbuffer::{K_BYTE_COUNT_MASK, RBuffer};
use crate::tree::{BranchInfo, LeafType, Tree};
use crate::wbuffer::{K_CLASS_MASK, K_MAP_OFFSET, K_NEW_CLASS_TAG, WBuffer};

/// TTree class version written by [`write_ttree`].
const TTREE_VERSION: u16 = 20;
/// TBranch class version written by [`write_ttree`].
const TBRANCH_VERSION: u16 = 13;
/// Oldest TTree layout the reader understands.
const TTREE_MIN_VERSION: u16 = 16;

/// Read a TTree from a decompressed TKey payload.
///
/// `key_len` is the length of the key header that preceded the payload on
/// disk; ROOT's class references are offsets into the whole record.
pub fn read_ttree(payload: &[u8], key_len: usize) -> Result<Tree> {
    let mut r = RBuffer::new(payload);
    let mut refs = RefTracker::new(key_len);

    // TTree version header
    let (tree_ver, tree_end) = r.read_version()?;
    let tree_end =
        tree_end.ok_or_else(|| RootError::Deserialization("TTree missing byte count".into()))?;
    if tree_ver < TTREE_MIN_VERSION {
        return Err(RootError::Deserialization(format!(
            "TTree version {} is older than {}",
            tree_ver, TTREE_MIN_VERSION
        )));
    }

    let (name, title) = r.read_tnamed()?;

    // TAttLine, TAttFill, TAttMarker
    r.skip_versioned()?;
    r.skip_versioned()?;
    r.skip_versioned()?;

    let entries = r.read_i64()?.max(0) as u64; // fEntries
    let _tot_bytes = r.read_i64()?;
    let _zip_bytes = r.read_i64()?;
    let _saved_bytes = r.read_i64()?;
    if tree_ver >= 17 {
        let _flushed_bytes = r.read_i64()?;
    }

    let _weight = r.read_f64()?;
    let _timer_interval = r.read_i32()?;
    let _scan_field = r.read_i32()?;
    let _update = r.read_i32()?;
    if tree_ver >= 17 {
        let _default_entry_offset_len = r.read_i32()?;
    }
    let n_cluster_range = if tree_ver >= 19 { r.read_i32()?.max(0) as usize } else { 0 };

    let _max_entries = r.read_i64()?;
    let _max_entry_loop = r.read_i64()?;
    let _max_virtual_size = r.read_i64()?;
    let _auto_save = r.read_i64()?;
    if tree_ver >= 17 {
        let _auto_flush = r.read_i64()?;
    }
    let _estimate = r.read_i64()?;

    // fClusterRangeEnd / fClusterSize: pointer arrays, each behind a 1-byte presence flag
    if tree_ver >= 19 {
        for _ in 0..2 {
            if r.read_u8()? != 0 {
                r.skip(n_cluster_range * 8)?;
            }
        }
    }

    // fIOFeatures
    if tree_ver >= 20 {
        r.skip_versioned()?;
    }

    let mut branches = Vec::new();
    read_branch_array(&mut r, &mut refs, &mut branches)?;

    // fLeaves, fAliases, fIndexValues, ... are not needed
    r.set_pos(tree_end);

    Ok(Tree { name, title, entries, branches })
}

// ── ROOT reference system ──────────────────────────────────────

/// Class tags seen so far in one record.
///
/// New classes are announced with `kNewClassTag` followed by the class name;
/// later objects of the same class refer back with `kClassMask | offset`,
/// where `offset` is the record position of the announcing tag plus
/// `kMapOffset`. The record includes the key header, so payload positions are
/// displaced by `key_len`.
struct RefTracker {
    key_len: usize,
    classes: HashMap<usize, String>,
}

/// Header of one object streamed through a pointer.
struct ObjectHeader {
    /// Class name, if the class tag could be resolved.
    class_name: Option<String>,
    /// Payload position right after the object.
    end: usize,
}

impl RefTracker {
    fn new(key_len: usize) -> Self {
        Self { key_len, classes: HashMap::new() }
    }

    fn lookup(&self, tag: u32) -> Option<&str> {
        let pos = (tag as usize).checked_sub(self.key_len + K_MAP_OFFSET as usize)?;
        self.classes.get(&pos).map(String::as_str)
    }

    /// Read a pointer-to-object header.
    ///
    /// Returns `None` for null pointers and references to objects already
    /// streamed; those carry no inline data.
    fn read_object(&mut self, r: &mut RBuffer) -> Result<Option<ObjectHeader>> {
        let tag_pos = r.pos();
        let tag = r.read_u32()?;

        if tag == 0 {
            return Ok(None);
        }
        if tag & K_BYTE_COUNT_MASK == 0 {
            log::trace!("object reference {:#010x} at {}", tag, tag_pos);
            return Ok(None);
        }

        let end = tag_pos + 4 + (tag & !K_BYTE_COUNT_MASK) as usize;
        if end > r.len() {
            return Err(RootError::BufferUnderflow {
                offset: tag_pos,
                need: end - tag_pos,
                have: r.len() - tag_pos,
            });
        }

        let class_pos = r.pos();
        let class_tag = r.read_u32()?;
        let class_name = if class_tag == K_NEW_CLASS_TAG {
            let name = r.read_cstring()?;
            self.classes.insert(class_pos, name.clone());
            Some(name)
        } else if class_tag & K_CLASS_MASK != 0 {
            let name = self.lookup(class_tag & !K_CLASS_MASK).map(str::to_string);
            if name.is_none() {
                log::debug!("unresolved class reference {:#010x} at {}", class_tag, class_pos);
            }
            name
        } else {
            return Err(RootError::Deserialization(format!(
                "unexpected class tag {:#010x} at pos {}",
                class_tag, class_pos
            )));
        };

        Ok(Some(ObjectHeader { class_name, end }))
    }
}

// ── TObjArray parsing ──────────────────────────────────────────

/// Read a TObjArray header; returns `(count, end_pos)`.
fn read_objarray_header(r: &mut RBuffer) -> Result<(usize, usize)> {
    let (_ver, end) = r.read_version()?;
    let end = end.ok_or_else(|| RootError::Deserialization("TObjArray missing byte count".into()))?;
    r.read_tobject()?;
    let _name = r.read_string()?;
    let count = r.read_i32()?.max(0) as usize;
    let _low_bound = r.read_i32()?;
    Ok((count, end))
}

/// Read a TObjArray of branches, appending each branch followed by its sub-branches.
fn read_branch_array(
    r: &mut RBuffer,
    refs: &mut RefTracker,
    out: &mut Vec<BranchInfo>,
) -> Result<()> {
    let (count, arr_end) = read_objarray_header(r)?;

    for _ in 0..count {
        let Some(obj) = refs.read_object(r)? else { continue };
        let Some(class_name) = obj.class_name else {
            r.set_pos(obj.end);
            continue;
        };

        let slot = out.len();
        let parsed = if class_name == "TBranch" {
            read_tbranch(r, refs, out)
        } else {
            // Derived branch classes stream their TBranch base first.
            r.read_version().and_then(|_| read_tbranch(r, refs, out))
        };

        match parsed {
            Ok(mut branch) => {
                branch.class_name = class_name;
                out.insert(slot, branch);
            }
            Err(e) => {
                log::debug!("skipping {} branch: {}", class_name, e);
                out.truncate(slot);
            }
        }
        r.set_pos(obj.end);
    }

    r.set_pos(arr_end);
    Ok(())
}

// ── TBranch parsing ────────────────────────────────────────────

/// Read a single TBranch; sub-branches are appended to `subs`.
fn read_tbranch(
    r: &mut RBuffer,
    refs: &mut RefTracker,
    subs: &mut Vec<BranchInfo>,
) -> Result<BranchInfo> {
    let (branch_ver, branch_end) = r.read_version()?;
    let branch_end = branch_end
        .ok_or_else(|| RootError::Deserialization("TBranch missing byte count".into()))?;

    let (name, title) = r.read_tnamed()?;

    // TAttFill
    r.skip_versioned()?;

    let _compress = r.read_i32()?;
    let _basket_size = r.read_i32()?;
    let entry_offset_len = r.read_i32()?;
    let write_basket = r.read_i32()?.max(0) as usize;
    let _entry_number = r.read_i64()?;

    // fIOFeatures
    if branch_ver >= 13 {
        r.skip_versioned()?;
    }

    let _offset = r.read_i32()?;
    let max_baskets = r.read_i32()?.max(0) as usize;
    let _split_level = r.read_i32()?;
    let entries = r.read_i64()?.max(0) as u64;
    if branch_ver >= 11 {
        let _first_entry = r.read_i64()?;
    }
    let _tot_bytes = r.read_i64()?;
    let _zip_bytes = r.read_i64()?;

    read_branch_array(r, refs, subs)?;
    let leaves = read_leaf_array(r, refs)?;

    // fBaskets: baskets still in memory when the tree was written
    r.skip_versioned()?;

    if write_basket > max_baskets {
        return Err(RootError::Deserialization(format!(
            "branch '{}' claims {} baskets but has room for {}",
            name, write_basket, max_baskets
        )));
    }

    // fBasketBytes (i32), fBasketEntry (i64), fBasketSeek (i64): [fMaxBaskets] each
    let basket_bytes = read_basket_array(r, max_baskets, 4)?
        .into_iter()
        .take(write_basket)
        .map(|v| v as u32)
        .collect();
    let basket_entry = read_basket_array(r, max_baskets, 8)?
        .into_iter()
        .take(write_basket + 1)
        .map(|v| v.max(0) as u64)
        .collect();
    let basket_seek = read_basket_array(r, max_baskets, 8)?
        .into_iter()
        .take(write_basket)
        .map(|v| v.max(0) as u64)
        .collect();

    if branch_end > r.pos() {
        r.set_pos(branch_end);
    }

    let first = leaves.first();
    Ok(BranchInfo {
        name,
        title,
        class_name: "TBranch".to_string(),
        leaf_type: first.and_then(|l| l.leaf_type),
        n_leaves: leaves.len(),
        leaf_len: first.map_or(0, |l| l.len),
        has_leaf_count: first.is_some_and(|l| l.has_count),
        entries,
        entry_offset_len,
        basket_bytes,
        basket_entry,
        basket_seek,
        n_baskets: write_basket,
    })
}

/// Read one basket bookkeeping array, returning an empty list when absent.
fn read_basket_array(r: &mut RBuffer, n: usize, width: usize) -> Result<Vec<i64>> {
    if r.read_u8()? == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let v = if width == 4 { r.read_i32()? as i64 } else { r.read_i64()? };
        out.push(v);
    }
    Ok(out)
}

// ── TLeaf parsing ──────────────────────────────────────────────

struct LeafInfo {
    leaf_type: Option<LeafType>,
    len: i32,
    has_count: bool,
}

/// Read a TObjArray of TLeaf objects.
fn read_leaf_array(r: &mut RBuffer, refs: &mut RefTracker) -> Result<Vec<LeafInfo>> {
    let (count, arr_end) = read_objarray_header(r)?;
    let mut leaves = Vec::with_capacity(count);

    for _ in 0..count {
        let Some(obj) = refs.read_object(r)? else { continue };
        let class_name = obj.class_name.unwrap_or_default();
        match read_tleaf(r, refs, &class_name) {
            Ok(leaf) => leaves.push(leaf),
            Err(e) => {
                log::debug!("unreadable {} leaf: {}", class_name, e);
                leaves.push(LeafInfo { leaf_type: None, len: 0, has_count: false });
            }
        }
        r.set_pos(obj.end);
    }

    r.set_pos(arr_end);
    Ok(leaves)
}

/// Read the `TLeaf` base of a leaf object (the subclass header comes first).
fn read_tleaf(r: &mut RBuffer, refs: &mut RefTracker, class_name: &str) -> Result<LeafInfo> {
    let _subclass = r.read_version()?;
    let (_ver, _end) = r.read_version()?;
    let _named = r.read_tnamed()?;
    let len = r.read_i32()?; // fLen
    let _len_type = r.read_i32()?;
    let _offset = r.read_i32()?;
    let _is_range = r.read_bool()?;
    let is_unsigned = r.read_bool()?;

    // fLeafCount: pointer to the leaf holding this leaf's per-entry length
    let tag_pos = r.pos();
    let has_count = r.read_u32()? != 0;
    r.set_pos(tag_pos);
    if let Some(count_leaf) = refs.read_object(r)? {
        r.set_pos(count_leaf.end);
    }

    Ok(LeafInfo { leaf_type: LeafType::from_class(class_name, is_unsigned), len, has_count })
}

// ── Writing ────────────────────────────────────────────────────

/// On-disk layout of one flat branch, as recorded in the TTree streamer.
#[derive(Debug, Clone)]
pub struct BranchLayout {
    /// Branch (and leaf) name.
    pub name: String,
    /// Element type.
    pub leaf_type: LeafType,
    /// ROOT compression setting of the baskets.
    pub compress: i32,
    /// Target basket buffer size.
    pub basket_size: i32,
    /// Number of entries.
    pub entries: u64,
    /// Stored size of each basket key (header included).
    pub basket_bytes: Vec<u32>,
    /// First entry of each basket.
    pub basket_entry: Vec<u64>,
    /// File position of each basket key.
    pub basket_seek: Vec<u64>,
    /// Uncompressed bytes (key headers included).
    pub tot_bytes: i64,
    /// Stored bytes (key headers included).
    pub zip_bytes: i64,
}

/// Everything [`write_ttree`] needs to stream a tree of flat branches.
#[derive(Debug, Clone)]
pub struct TreeLayout {
    /// Tree name.
    pub name: String,
    /// Tree title.
    pub title: String,
    /// Number of entries.
    pub entries: u64,
    /// Branches in column order.
    pub branches: Vec<BranchLayout>,
}

/// Stream a TTree (class version 20) into `w`.
///
/// `w` must be displaced by the key length of the record it will be stored in.
pub fn write_ttree(w: &mut WBuffer, tree: &TreeLayout) {
    let tot_bytes: i64 = tree.branches.iter().map(|b| b.tot_bytes).sum();
    let zip_bytes: i64 = tree.branches.iter().map(|b| b.zip_bytes).sum();

    let start = w.begin_versioned(TTREE_VERSION);
    w.write_tnamed(&tree.name, &tree.title);
    write_att_line(w);
    write_att_fill(w);
    write_att_marker(w);

    w.write_i64(tree.entries as i64);
    w.write_i64(tot_bytes);
    w.write_i64(zip_bytes);
    w.write_i64(zip_bytes); // fSavedBytes
    w.write_i64(zip_bytes); // fFlushedBytes
    w.write_f64(1.0); // fWeight
    w.write_i32(0); // fTimerInterval
    w.write_i32(25); // fScanField
    w.write_i32(0); // fUpdate
    w.write_i32(1000); // fDefaultEntryOffsetLen
    w.write_i32(0); // fNClusterRange
    w.write_i64(1_000_000_000_000); // fMaxEntries
    w.write_i64(1_000_000_000_000); // fMaxEntryLoop
    w.write_i64(0); // fMaxVirtualSize
    w.write_i64(-300_000_000); // fAutoSave
    w.write_i64(-30_000_000); // fAutoFlush
    w.write_i64(1_000_000); // fEstimate
    w.write_u8(0); // fClusterRangeEnd
    w.write_u8(0); // fClusterSize
    write_io_features(w);

    // fBranches
    let arr = begin_objarray(w, tree.branches.len());
    for (id, branch) in tree.branches.iter().enumerate() {
        let obj = w.begin_object("TBranch");
        write_tbranch(w, branch, &tree.name, id);
        w.end_object(obj);
    }
    w.end_versioned(arr);

    // fLeaves: references to the leaves streamed inside the branches
    let arr = begin_objarray(w, tree.branches.len());
    for id in 0..tree.branches.len() {
        w.write_object_ref(id);
    }
    w.end_versioned(arr);

    w.write_null(); // fAliases
    w.write_i32(0); // fIndexValues
    w.write_i32(0); // fIndex
    w.write_null(); // fTreeIndex
    w.write_null(); // fFriends
    w.write_null(); // fUserInfo
    w.write_null(); // fBranchRef
    w.end_versioned(start);
}

fn write_tbranch(w: &mut WBuffer, b: &BranchLayout, tree_name: &str, leaf_id: usize) {
    let n_baskets = b.basket_seek.len();
    // fBasketEntry needs a slot past the last basket for the total entry count
    let max_baskets = (n_baskets + 1).max(10);

    let start = w.begin_versioned(TBRANCH_VERSION);
    w.write_tnamed(&b.name, &format!("{}/{}", b.name, b.leaf_type.code()));
    write_att_fill(w);
    w.write_i32(b.compress);
    w.write_i32(b.basket_size);
    w.write_i32(0); // fEntryOffsetLen
    w.write_i32(n_baskets as i32); // fWriteBasket
    w.write_i64(b.entries as i64); // fEntryNumber
    write_io_features(w);
    w.write_i32(0); // fOffset
    w.write_i32(max_baskets as i32);
    w.write_i32(0); // fSplitLevel
    w.write_i64(b.entries as i64);
    w.write_i64(0); // fFirstEntry
    w.write_i64(b.tot_bytes);
    w.write_i64(b.zip_bytes);

    // fBranches
    let arr = begin_objarray(w, 0);
    w.end_versioned(arr);

    // fLeaves
    let arr = begin_objarray(w, 1);
    let obj = w.begin_object(b.leaf_type.class_name());
    w.register_object(leaf_id, obj);
    write_tleaf(w, &b.name, b.leaf_type);
    w.end_object(obj);
    w.end_versioned(arr);

    // fBaskets
    let arr = begin_objarray(w, 0);
    w.end_versioned(arr);

    w.write_u8(1);
    for i in 0..max_baskets {
        w.write_i32(b.basket_bytes.get(i).map_or(0, |&v| v as i32));
    }
    w.write_u8(1);
    for i in 0..max_baskets {
        let v = if i < n_baskets {
            b.basket_entry[i]
        } else if i == n_baskets {
            b.entries
        } else {
            0
        };
        w.write_i64(v as i64);
    }
    w.write_u8(1);
    for i in 0..max_baskets {
        w.write_i64(b.basket_seek.get(i).map_or(0, |&v| v as i64));
    }
    w.write_string(""); // fFileName
    w.end_versioned(start);

    log::trace!("streamed branch {}.{} ({} baskets)", tree_name, b.name, n_baskets);
}

fn write_tleaf(w: &mut WBuffer, name: &str, leaf_type: LeafType) {
    let start = w.begin_versioned(1);
    let base = w.begin_versioned(2);
    w.write_tnamed(name, name);
    w.write_i32(1); // fLen
    w.write_i32(leaf_type.byte_size() as i32); // fLenType
    w.write_i32(0); // fOffset
    w.write_bool(false); // fIsRange
    w.write_bool(leaf_type.is_unsigned());
    w.write_null(); // fLeafCount
    w.end_versioned(base);

    // fMinimum, fMaximum in the leaf's storage width
    let zeros = vec![0u8; 2 * leaf_type.byte_size()];
    w.write_bytes(&zeros);
    w.end_versioned(start);
}

fn begin_objarray(w: &mut WBuffer, count: usize) -> usize {
    let start = w.begin_versioned(3);
    w.write_tobject();
    w.write_string("");
    w.write_i32(count as i32);
    w.write_i32(0); // fLowerBound
    start
}

fn write_att_line(w: &mut WBuffer) {
    let start = w.begin_versioned(2);
    w.write_i16(602);
    w.write_i16(1);
    w.write_i16(1);
    w.end_versioned(start);
}

fn write_att_fill(w: &mut WBuffer) {
    let start = w.begin_versioned(2);
    w.write_i16(0);
    w.write_i16(1001);
    w.end_versioned(start);
}

fn write_att_marker(w: &mut WBuffer) {
    let start = w.begin_versioned(2);
    w.write_i16(1);
    w.write_i16(1);
    w.write_f32(1.0);
    w.end_versioned(start);
}

fn write_io_features(w: &mut WBuffer) {
    let start = w.begin_versioned(1);
    w.write_u8(0);
    w.end_versioned(start);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TreeLayout {
        let branch = |name: &str, leaf_type, seek| BranchLayout {
            name: name.to_string(),
            leaf_type,
            compress: 101,
            basket_size: 32000,
            entries: 5,
            basket_bytes: vec![90, 80],
            basket_entry: vec![0, 3],
            basket_seek: vec![seek, seek + 90],
            tot_bytes: 200,
            zip_bytes: 170,
        };
        TreeLayout {
            name: "events".into(),
            title: "test tree".into(),
            entries: 5,
            branches: vec![
                branch("x", LeafType::F64, 400),
                branch("n", LeafType::U32, 600),
                branch("y", LeafType::F64, 800),
                branch("ok", LeafType::Bool, 1000),
            ],
        }
    }

    #[test]
    fn written_tree_parses_back() {
        let key_len = 57;
        let mut w = WBuffer::with_displacement(key_len);
        write_ttree(&mut w, &layout());
        let tree = read_ttree(w.as_slice(), key_len as usize).unwrap();

        assert_eq!(tree.name, "events");
        assert_eq!(tree.title, "test tree");
        assert_eq!(tree.entries, 5);
        assert_eq!(tree.branch_names(), vec!["x", "n", "y", "ok"]);

        // the second TLeafD is a class reference to the first
        let y = tree.find_branch("y").unwrap();
        assert_eq!(y.leaf_type, Some(LeafType::F64));
        assert_eq!(y.title, "y/D");
        assert!(y.is_flat());
        assert_eq!(y.basket_seek, vec![800, 890]);
        assert_eq!(y.basket_entry, vec![0, 3, 5]);
        assert_eq!(y.basket_bytes, vec![90, 80]);

        assert_eq!(tree.find_branch("n").unwrap().leaf_type, Some(LeafType::U32));
        assert_eq!(tree.find_branch("ok").unwrap().leaf_type, Some(LeafType::Bool));
    }

    #[test]
    fn wrong_displacement_loses_class_references() {
        let mut w = WBuffer::with_displacement(57);
        write_ttree(&mut w, &layout());
        let tree = read_ttree(w.as_slice(), 0).unwrap();
        // only the first branch announces TBranch; the rest are unresolved references
        assert_eq!(tree.branch_names(), vec!["x"]);
    }

    #[test]
    fn truncated_tree_is_an_error() {
        let mut w = WBuffer::with_displacement(57);
        write_ttree(&mut w, &layout());
        let bytes = w.into_inner();
        assert!(read_ttree(&bytes[..bytes.len() / 2], 57).is_err());
    }

    #[test]
    fn old_tree_versions_are_rejected() {
        let mut w = WBuffer::new();
        let start = w.begin_versioned(5);
        w.write_u32(0);
        w.end_versioned(start);
        assert!(matches!(read_ttree(w.as_slice(), 0), Err(RootError::Deserialization(_))));
    }
}
