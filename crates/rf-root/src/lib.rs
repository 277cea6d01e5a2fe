//! # rf-root
//!
//! Native ROOT file reader and writer for trees of flat branches.
//!
//! Reads `TTree`s whose branches hold one primitive value per entry and
//! writes new ones, without ROOT or Python installed. Baskets compressed with
//! zlib, LZ4, ZSTD or XZ are read, and all four can be written.
//!
//! ## Example
//!
//! ```no_run
//! use rf_root::{BranchData, RootFile, RootWriter, TreeSpec, WriteMode};
//!
//! let px = BranchData::from(vec![1.0f64, 2.0, 3.0]);
//! let mut w = RootWriter::create("out.root", WriteMode::Recreate).unwrap();
//! w.write_tree(&TreeSpec::new("events").branch("px", &px)).unwrap();
//! w.finish().unwrap();
//!
//! let f = RootFile::open("out.root").unwrap();
//! let tree = f.get_tree("events").unwrap();
//! let values = f.read_branch(&tree, "px", 0..tree.entries).unwrap();
//! assert_eq!(values, px);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod basket;
pub mod branch_reader;
pub mod cache;
pub mod compress;
pub mod data;
pub mod datasource;
pub mod decompress;
pub mod directory;
pub mod error;
pub mod expr;
pub mod file;
pub mod key;
pub mod objects;
pub mod rbuffer;
pub mod tree;
pub mod wbuffer;
pub mod writer;

pub use branch_reader::BranchReader;
pub use cache::{BasketCache, CacheConfig, CacheStats};
pub use compress::{Algorithm, Compression};
pub use data::BranchData;
pub use error::{Result, RootError};
pub use expr::CompiledExpr;
pub use file::RootFile;
pub use key::KeyInfo;
pub use tree::{BranchInfo, LeafType, Tree};
pub use writer::{DEFAULT_BASKET_SIZE, RootWriter, TreeSpec, WriteMode};
