#![forbid(unsafe_code)]

//! Disk-resident B+Tree built from [`KeyBlock`](crate::storage::block::KeyBlock)s.
//!
//! Block 0 holds [`TreeMetadata`]; every other block is a leaf or an
//! internal node. Leaves are threaded through their extra pointer in
//! ascending key order.

mod cursor;
mod dirty;
mod insert;
mod meta;
mod options;
mod stats;
mod tree;
mod verify;

pub use cursor::RangeCursor;
pub use meta::{TreeMetadata, TreeSchema, META_LEN, META_OFFSET};
pub use options::{InternalLayout, TreeOptions, DEFAULT_BLOCK_SIZE};
pub use stats::{TreeStats, TreeStatsSnapshot};
pub use tree::BPlusTree;
pub use verify::{VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
