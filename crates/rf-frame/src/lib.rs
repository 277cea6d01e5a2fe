//! # rf-frame
//!
//! Typed in-memory tables read from and written to ROOT TTrees.
//!
//! [`read_root`] loads the flat branches of a tree into a [`DataFrame`],
//! selecting columns with shell patterns (`*`, `?`, `[...]`, `{A,B}`) and
//! rows with a selection expression. [`to_root`] writes a frame back as a
//! tree, replacing the file or appending to it.
//!
//! ```no_run
//! use rf_frame::{DataFrame, Mode, ReadOptions, Series, WriteOptions, read_root};
//!
//! let df = DataFrame::from_columns([
//!     Series::new("x", vec![1.0f64, 2.0, 3.0]),
//!     Series::new("n", vec![4i32, 5, 6]),
//! ])?;
//! df.to_root("out.root", &WriteOptions::new().with_tree("t").with_mode(Mode::Write))?;
//!
//! let back = read_root("out.root", &ReadOptions::new().with_where("x > 1"))?;
//! assert_eq!(back.n_rows(), 2);
//! # Ok::<(), rf_frame::FrameError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod pattern;
pub mod read;
pub mod write;

pub use error::{FrameError, Result};
pub use frame::{ColumnData, DataFrame, INDEX, Series};
pub use pattern::{expand_braces, match_branches};
pub use read::{
    ChunkIter, DEFAULT_CHUNK_SIZE, ReadOptions, list_branches, list_trees, read_root,
    read_root_chunks, resolve_tree,
};
pub use write::{Mode, WriteOptions, to_root};

pub use rf_root::{CacheConfig, Compression, LeafType};
