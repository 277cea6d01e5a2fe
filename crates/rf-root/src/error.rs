//! Error types for ROOT file reading and writing.

use thiserror::Error;

/// Errors produced while decoding or encoding ROOT files.
#[derive(Error, Debug)]
pub enum RootError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File does not start with the `root` magic or is too small.
    #[error("not a ROOT file (bad magic or truncated header)")]
    BadMagic,

    /// Read past the end of a buffer.
    #[error("buffer underflow at offset {offset}: need {need} bytes, have {have}")]
    BufferUnderflow {
        /// Read position.
        offset: usize,
        /// Bytes requested.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// Malformed or unsupported compressed block.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Compression of an output block failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Malformed streamer data.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No key with this name (or path) exists.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// No TTree with this name exists.
    #[error("tree not found: {0}")]
    TreeNotFound(String),

    /// Tree has no branch with this name.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Branch exists but its layout cannot be read as a flat column.
    #[error("branch '{branch}' is not supported: {reason}")]
    UnsupportedBranch {
        /// Branch name.
        branch: String,
        /// What makes it unreadable.
        reason: String,
    },

    /// Branch data has a different type than requested.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Selection expression failed to parse.
    #[error("expression error: {0}")]
    Expression(String),

    /// Invalid input to the writer.
    #[error("write error: {0}")]
    Write(String),

    /// Output would not fit the 32-bit file layout.
    #[error("file would grow to {0} bytes, beyond the small-file layout limit")]
    FileTooLarge(u64),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RootError>;
