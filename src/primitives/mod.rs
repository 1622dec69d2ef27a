//! Low-level primitives underneath the tree.
//!
//! Includes byte encoding, positioned file I/O, block caches and the
//! block store that ties a file to a cache.

/// Byte-level encoding and key ordering.
pub mod bytes;

/// Block caches and eviction policies.
pub mod cache;

/// Positioned file I/O abstractions.
pub mod io;

/// Fixed-size block storage over one file.
pub mod store;
