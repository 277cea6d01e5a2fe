//! Reading TTrees into [`DataFrame`]s.

use std::ops::Range;
use std::path::Path;

use rf_root::{CacheConfig, CompiledExpr, RootError, RootFile, Tree};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::frame::{DataFrame, INDEX, Series};
use crate::pattern::match_branches;

/// Rows per chunk when [`read_root_chunks`] is called without a chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// What to read from a ROOT file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Tree path (`name` or `dir/name`); may be omitted when the file holds exactly one tree.
    pub tree_key: Option<String>,
    /// Column patterns to read; empty reads every branch.
    pub columns: Vec<String>,
    /// Column patterns to leave out, applied after `columns`.
    pub ignore: Vec<String>,
    /// Row selection expression, e.g. `"pt > 20 && abs(eta) < 2.4"`.
    #[serde(rename = "where")]
    pub where_: Option<String>,
    /// Rows per chunk for [`read_root_chunks`]. Ignored by [`read_root`].
    pub chunk_size: Option<usize>,
    /// Basket cache used while reading.
    pub cache: CacheConfig,
}

impl ReadOptions {
    /// Default options: the only tree, all columns, no selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the tree at `key`.
    pub fn with_tree(mut self, key: impl Into<String>) -> Self {
        self.tree_key = Some(key.into());
        self
    }

    /// Read only branches matching these patterns.
    pub fn with_columns<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.columns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Leave out branches matching these patterns.
    pub fn with_ignore<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.ignore = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Keep only rows where `expr` is true.
    pub fn with_where(mut self, expr: impl Into<String>) -> Self {
        self.where_ = Some(expr.into());
        self
    }

    /// Rows per chunk for chunked reads.
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    /// Basket cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// An opened tree with its resolved branch selection.
struct ReadPlan {
    file: RootFile,
    tree: Tree,
    selected: Vec<String>,
    expr: Option<CompiledExpr>,
}

impl ReadPlan {
    fn open(path: &Path, opts: &ReadOptions) -> Result<Self> {
        let mut file = RootFile::open(path)?;
        file.set_cache_config(opts.cache);

        let tree_key = match &opts.tree_key {
            Some(key) => key.clone(),
            None => only_tree(&file)?,
        };
        let tree = file.get_tree(&tree_key)?;
        let branches = tree.branch_names();

        let mut selected = if opts.columns.is_empty() {
            branches.iter().map(|b| b.to_string()).collect()
        } else {
            let mut patterns = opts.columns.clone();
            if branches.contains(&INDEX) {
                patterns.push(INDEX.to_string());
            }
            match_branches(&branches, &patterns, true)?
        };

        if !opts.ignore.is_empty() {
            let ignored = match_branches(&branches, &opts.ignore, false)?;
            if ignored.iter().any(|b| b == INDEX) {
                return Err(FrameError::IndexIgnored);
            }
            log::debug!("ignoring branches {:?}", ignored);
            selected.retain(|b| !ignored.contains(b));
        }

        check_columns(&tree, &selected)?;

        let expr = opts.where_.as_deref().map(CompiledExpr::compile).transpose()?;
        if let Some(expr) = &expr {
            for name in &expr.required_branches {
                if let Some(reason) = unsupported_reason(&tree, name)? {
                    let branch = name.to_string();
                    return Err(RootError::UnsupportedBranch { branch, reason }.into());
                }
            }
        }

        log::info!(
            "reading {} of {} branches from {}:{} ({} entries)",
            selected.len(),
            tree.branches.len(),
            path.display(),
            tree_key,
            tree.entries
        );
        Ok(Self { file, tree, selected, expr })
    }

    fn entries(&self) -> u64 {
        self.tree.entries
    }

    /// Read entries `range` of the selected branches and apply the selection.
    fn read(&self, range: Range<u64>) -> Result<DataFrame> {
        let range = range.start.min(self.entries())..range.end.min(self.entries());
        let n_rows = (range.end - range.start) as usize;

        let mut index = None;
        let mut columns = Vec::with_capacity(self.selected.len());
        for name in &self.selected {
            let data = self.file.read_branch(&self.tree, name, range.clone())?;
            let series = Series::new(name.clone(), data);
            if name == INDEX {
                index = Some(series);
            } else {
                columns.push(series);
            }
        }

        let mask = match &self.expr {
            Some(expr) => Some(self.eval_mask(expr, &columns, index.as_ref(), range, n_rows)?),
            None => None,
        };

        let mut df = DataFrame::from_columns(columns)?;
        if let Some(index) = index {
            df = df.with_index(index)?;
        }
        match mask {
            Some(mask) if df.n_columns() > 0 || df.index().is_some() => df.filter(&mask),
            _ => Ok(df),
        }
    }

    fn eval_mask(
        &self,
        expr: &CompiledExpr,
        columns: &[Series],
        index: Option<&Series>,
        range: Range<u64>,
        n_rows: usize,
    ) -> Result<Vec<bool>> {
        let mut values: Vec<Vec<f64>> = Vec::with_capacity(expr.required_branches.len());
        for name in &expr.required_branches {
            let loaded = columns.iter().chain(index).find(|s| &s.name == name);
            let column = match loaded {
                Some(series) => series.data.to_f64(),
                None => self.file.read_branch(&self.tree, name, range.clone())?.to_f64(),
            };
            values.push(column);
        }
        let refs: Vec<&[f64]> = values.iter().map(Vec::as_slice).collect();
        Ok(expr.eval_mask(&refs, n_rows)?)
    }
}

fn only_tree(file: &RootFile) -> Result<String> {
    let mut trees = file.list_trees()?;
    match trees.len() {
        0 => Err(FrameError::NoTrees(file.path().to_path_buf())),
        1 => Ok(trees.remove(0)),
        _ => Err(FrameError::AmbiguousTree { path: file.path().to_path_buf(), trees }),
    }
}

fn unsupported_reason(tree: &Tree, name: &str) -> Result<Option<String>> {
    let info = tree.find_branch(name).ok_or_else(|| RootError::BranchNotFound(name.to_string()))?;
    Ok(info.unsupported_reason())
}

/// Every selected branch must be readable as a flat column.
fn check_columns(tree: &Tree, selected: &[String]) -> Result<()> {
    for name in selected {
        if let Some(reason) = unsupported_reason(tree, name)? {
            return Err(FrameError::UnsupportedBranch { branch: name.clone(), reason });
        }
    }
    Ok(())
}

/// Read a tree into a [`DataFrame`].
///
/// A branch called `index` is always read when present (unless no column
/// patterns are given, in which case every branch is read anyway) and
/// becomes the frame's index.
///
/// ```no_run
/// use rf_frame::{ReadOptions, read_root};
///
/// let opts = ReadOptions::new()
///     .with_tree("events")
///     .with_columns(["jet_{pt,eta}", "n*"])
///     .with_where("jet_pt > 30");
/// let df = read_root("events.root", &opts)?;
/// println!("{} rows", df.n_rows());
/// # Ok::<(), rf_frame::FrameError>(())
/// ```
pub fn read_root(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<DataFrame> {
    let plan = ReadPlan::open(path.as_ref(), opts)?;
    plan.read(0..plan.entries())
}

/// Read a tree as consecutive chunks of `opts.chunk_size` entries.
///
/// The selection is applied per chunk, so chunks can hold fewer rows (or
/// none). Stacking all chunks gives the same frame as [`read_root`].
pub fn read_root_chunks(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<ChunkIter> {
    let chunk_size = opts.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
    if chunk_size == 0 {
        return Err(FrameError::InvalidOption("chunk_size must be positive".to_string()));
    }
    let plan = ReadPlan::open(path.as_ref(), opts)?;
    let n_chunks = plan.entries().div_ceil(chunk_size as u64);
    Ok(ChunkIter { plan, chunk_size: chunk_size as u64, next: 0, n_chunks })
}

/// Iterator over the chunks of a tree, produced by [`read_root_chunks`].
pub struct ChunkIter {
    plan: ReadPlan,
    chunk_size: u64,
    next: u64,
    n_chunks: u64,
}

impl ChunkIter {
    /// Total number of chunks, `ceil(entries / chunk_size)`.
    pub fn n_chunks(&self) -> u64 {
        self.n_chunks
    }

    /// Entries in the tree before selection.
    pub fn entries(&self) -> u64 {
        self.plan.entries()
    }

    /// Names of the branches read for every chunk.
    pub fn columns(&self) -> &[String] {
        &self.plan.selected
    }
}

impl Iterator for ChunkIter {
    type Item = Result<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.n_chunks {
            return None;
        }
        let start = self.next * self.chunk_size;
        self.next += 1;
        log::trace!("reading chunk {}/{}", self.next, self.n_chunks);
        Some(self.plan.read(start..start + self.chunk_size))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.n_chunks - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkIter {}

/// Paths of all trees in a file.
pub fn list_trees(path: impl AsRef<Path>) -> Result<Vec<String>> {
    Ok(RootFile::open(path)?.list_trees()?)
}

/// Branch names of a tree, in file order.
pub fn list_branches(path: impl AsRef<Path>, tree: &str) -> Result<Vec<String>> {
    let tree = RootFile::open(path)?.get_tree(tree)?;
    Ok(tree.branches.into_iter().map(|b| b.name).collect())
}

/// The tree [`read_root`] would pick for `opts`, without reading any data.
pub fn resolve_tree(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<String> {
    match &opts.tree_key {
        Some(key) => Ok(key.clone()),
        None => only_tree(&RootFile::open(path)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(name: &str, leaf_len: i32, has_leaf_count: bool) -> rf_root::BranchInfo {
        rf_root::BranchInfo {
            name: name.to_string(),
            title: String::new(),
            class_name: "TBranch".to_string(),
            leaf_type: Some(rf_root::LeafType::F32),
            n_leaves: 1,
            leaf_len,
            has_leaf_count,
            entries: 0,
            entry_offset_len: if has_leaf_count { 40 } else { 0 },
            basket_bytes: Vec::new(),
            basket_entry: Vec::new(),
            basket_seek: Vec::new(),
            n_baskets: 0,
        }
    }

    #[test]
    fn unsupported_column_names_branch_and_ignore_pattern() {
        let tree = Tree {
            name: "t".to_string(),
            title: String::new(),
            entries: 0,
            branches: vec![branch("pt", 1, false), branch("jets", 1, true), branch("p4", 4, false)],
        };
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(check_columns(&tree, &names(&["pt"])).is_ok());
        let err = check_columns(&tree, &names(&["pt", "jets", "p4"])).unwrap_err();
        assert!(matches!(&err, FrameError::UnsupportedBranch { branch, .. } if branch == "jets"));
        let msg = err.to_string();
        assert!(msg.contains("variable-length"), "{}", msg);
        assert!(msg.contains("ignore pattern 'jets'"), "{}", msg);

        let err = check_columns(&tree, &names(&["p4"])).unwrap_err();
        assert!(err.to_string().contains("fixed-size array of 4 elements"), "{}", err);
        assert!(matches!(
            check_columns(&tree, &names(&["nope"])),
            Err(FrameError::Root(RootError::BranchNotFound(_)))
        ));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ReadOptions = serde_json::from_str(
            r#"{"tree_key": "t", "columns": ["a*"], "where": "a > 1", "cache": {"enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(opts.tree_key.as_deref(), Some("t"));
        assert_eq!(opts.columns, vec!["a*"]);
        assert!(opts.ignore.is_empty());
        assert_eq!(opts.where_.as_deref(), Some("a > 1"));
        assert!(!opts.cache.enabled);
        assert_eq!(opts.cache.max_bytes, CacheConfig::default().max_bytes);
    }

    #[test]
    fn builder_sets_fields() {
        let opts = ReadOptions::new()
            .with_tree("dir/t")
            .with_columns(["x", "y"])
            .with_ignore(["z"])
            .with_where("x > 0")
            .with_chunk_size(10)
            .with_cache(CacheConfig::disabled());
        assert_eq!(opts.tree_key.as_deref(), Some("dir/t"));
        assert_eq!(opts.columns, vec!["x", "y"]);
        assert_eq!(opts.ignore, vec!["z"]);
        assert_eq!(opts.chunk_size, Some(10));
        assert_eq!(opts.cache, CacheConfig::disabled());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_root("/nonexistent/file.root", &ReadOptions::new()).unwrap_err();
        assert!(matches!(err, FrameError::Root(RootError::Io(_))));
    }
}
