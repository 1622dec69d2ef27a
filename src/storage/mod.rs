//! Block codec and the B+Tree built on it.

/// Fixed-size key blocks and their byte layout.
pub mod block;

/// B+Tree algorithms over key blocks.
pub mod bptree;
