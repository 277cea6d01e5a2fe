//! ROOT object deserialization dispatch.

mod ttree;

pub use ttree::{BranchLayout, TreeLayout, read_ttree, write_ttree};
