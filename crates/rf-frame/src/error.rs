//! Error types for table reading and writing.

use std::path::PathBuf;

use rf_root::RootError;
use thiserror::Error;

/// Errors produced by `rf-frame`.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Error from the ROOT layer (I/O, format, lookups).
    #[error(transparent)]
    Root(#[from] RootError),

    /// The file holds no trees.
    #[error("no trees found in {}", .0.display())]
    NoTrees(PathBuf),

    /// No tree was named and the file holds several.
    #[error("more than one tree found in {}: {}", .path.display(), .trees.join(", "))]
    AmbiguousTree {
        /// File path.
        path: PathBuf,
        /// Every tree path in the file.
        trees: Vec<String>,
    },

    /// A column pattern matched no branch.
    #[error("pattern '{0}' didn't match any branch")]
    PatternNoMatch(String),

    /// A column pattern is not valid glob syntax.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser message.
        reason: String,
    },

    /// A selected branch cannot be read as a flat column.
    #[error(
        "branch '{branch}' is not supported: {reason}; leave it out with ignore pattern '{branch}'"
    )]
    UnsupportedBranch {
        /// Branch name.
        branch: String,
        /// What makes it unreadable.
        reason: String,
    },

    /// An ignore pattern matched the `index` branch.
    #[error("index variable is being ignored")]
    IndexIgnored,

    /// Unknown write mode string.
    #[error("unknown mode '{0}', must be \"a\" or \"w\"")]
    InvalidMode(String),

    /// An option has a value that cannot be used.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A column does not have the table's row count.
    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        /// Column name.
        column: String,
        /// Row count of the table.
        expected: usize,
        /// Row count of the column.
        found: usize,
    },

    /// Two columns (or a column and the index) share a name.
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// No column with this name.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Frames with different layouts cannot be stacked.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FrameError>;
