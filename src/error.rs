//! Error type shared by every layer of the crate.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LeafError>;

/// Errors produced by the block layer and the tree built on top of it.
#[derive(Debug, Error)]
pub enum LeafError {
    /// Failure reported by the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Block dimensions or tree options rejected before any file state is touched.
    #[error("construction error: {0}")]
    Construction(String),
    /// Bytes on disk do not describe the block expected at `offset`.
    #[error("corruption detected at offset {offset}: {reason}")]
    Corruption {
        /// File offset of the offending block.
        offset: u64,
        /// What did not match.
        reason: String,
    },
    /// A block has no room left for the requested record or pointer.
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    /// Caller supplied a value that does not fit the block schema.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Options file could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl LeafError {
    pub(crate) fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corruption {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns true for errors that leave on-disk state suspect.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

impl From<toml::de::Error> for LeafError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
