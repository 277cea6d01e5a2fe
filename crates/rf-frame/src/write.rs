//! Writing [`DataFrame`]s as TTrees.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rf_root::{Compression, DEFAULT_BASKET_SIZE, RootWriter, TreeSpec, WriteMode};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::frame::{DataFrame, INDEX};

/// File mode of [`to_root`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// `"w"`: replace the file.
    #[default]
    #[serde(rename = "w", alias = "write")]
    Write,
    /// `"a"`: add the tree to the file, creating it if needed.
    #[serde(rename = "a", alias = "append")]
    Append,
}

impl FromStr for Mode {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "w" => Ok(Mode::Write),
            "a" => Ok(Mode::Append),
            other => Err(FrameError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Write => "w",
            Mode::Append => "a",
        })
    }
}

impl From<Mode> for WriteMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Write => WriteMode::Recreate,
            Mode::Append => WriteMode::Update,
        }
    }
}

/// How [`to_root`] writes a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Name of the written tree.
    pub tree_key: String,
    /// Replace or append.
    pub mode: Mode,
    /// Basket compression, e.g. `"zlib:1"` or `"zstd:5"` in config files.
    pub compression: Compression,
    /// Target basket size in bytes.
    pub basket_size: usize,
    /// Write the index as the first branch.
    pub write_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            tree_key: "default".to_string(),
            mode: Mode::Write,
            compression: Compression::default(),
            basket_size: DEFAULT_BASKET_SIZE,
            write_index: true,
        }
    }
}

impl WriteOptions {
    /// Defaults: tree `default`, mode `w`, zlib level 1, index written.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the written tree.
    pub fn with_tree(mut self, key: impl Into<String>) -> Self {
        self.tree_key = key.into();
        self
    }

    /// Replace or append.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Basket compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Target basket size in bytes.
    pub fn with_basket_size(mut self, basket_size: usize) -> Self {
        self.basket_size = basket_size;
        self
    }

    /// Whether to write the index branch.
    pub fn with_index(mut self, write_index: bool) -> Self {
        self.write_index = write_index;
        self
    }
}

/// Write `df` to `path` as a tree of flat branches.
///
/// The index comes first, as a branch named after it (`index` when
/// unnamed); a frame without an index writes `0..n_rows` as `int64`.
/// In [`Mode::Append`] an existing tree of the same name is kept and the
/// new one gets the next cycle.
pub fn to_root(df: &DataFrame, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let index = opts.write_index.then(|| {
        let mut index = df.index_or_range();
        if index.name.is_empty() {
            index.name = INDEX.to_string();
        }
        index
    });

    let mut spec = TreeSpec::new(opts.tree_key.as_str())
        .with_compression(opts.compression)
        .with_basket_size(opts.basket_size);
    if let Some(index) = &index {
        spec = spec.branch(index.name.as_str(), &index.data);
    }
    for column in df.columns() {
        spec = spec.branch(column.name.as_str(), &column.data);
    }

    let mut writer = RootWriter::create(path, opts.mode.into())?;
    writer.write_tree(&spec)?;
    writer.finish()?;
    log::info!(
        "wrote {} rows x {} branches to {}:{} (mode {}, {})",
        df.n_rows(),
        spec.branches.len(),
        path.display(),
        opts.tree_key,
        opts.mode,
        opts.compression
    );
    Ok(())
}

impl DataFrame {
    /// Write this frame to a ROOT file; see [`to_root`].
    pub fn to_root(&self, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<()> {
        to_root(self, path, opts)
    }
}
