//! LeafDB: an embedded, single-file B+Tree storage engine.
//!
//! Keys and record fields are fixed-width byte strings compared
//! lexicographically. The file is a sequence of equally sized blocks read
//! and written through a [`BlockStore`](primitives::store::BlockStore)
//! that keeps recently used blocks in a pluggable cache.

#![warn(missing_docs)]

pub mod error;
pub mod primitives;
pub mod storage;

pub use error::{LeafError, Result};
pub use primitives::cache::CachePolicy;
pub use storage::block::Record;
pub use storage::bptree::{BPlusTree, InternalLayout, RangeCursor, TreeOptions};
