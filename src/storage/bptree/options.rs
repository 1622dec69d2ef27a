use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LeafError, Result};
use crate::primitives::cache::CachePolicy;
use crate::storage::block::{BlockDims, BlockMode};

use super::meta::{TreeSchema, META_LEN};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Shape of internal nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalLayout {
    /// `POINTERS|EQUAPTRS|NODUP`: record `i` is the lower bound of child `i`.
    #[default]
    EqualPointers,
    /// `POINTERS|NODUP`: `n` separators between `n + 1` children.
    Classic,
}

impl InternalLayout {
    /// Mode flags stored in internal blocks of this layout.
    pub fn mode(self) -> BlockMode {
        match self {
            InternalLayout::EqualPointers => BlockMode::INTERNAL_EQUAL,
            InternalLayout::Classic => BlockMode::INTERNAL_CLASSIC,
        }
    }

    /// Layout whose internal blocks carry `mode`.
    pub fn from_mode(mode: BlockMode) -> Option<Self> {
        if mode == BlockMode::INTERNAL_EQUAL {
            Some(InternalLayout::EqualPointers)
        } else if mode == BlockMode::INTERNAL_CLASSIC {
            Some(InternalLayout::Classic)
        } else {
            None
        }
    }
}

/// Configuration for opening or creating a tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Width of every key in bytes.
    pub key_size: usize,
    /// Widths of the fields stored with each key.
    pub field_sizes: Vec<usize>,
    /// Size of every block, including block 0.
    pub block_size: usize,
    /// Block cache placed in front of the file.
    pub cache: CachePolicy,
    /// Shape of internal nodes.
    pub internal_layout: InternalLayout,
    /// Call `fsync` after every insert.
    pub sync_on_insert: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            key_size: 8,
            field_sizes: vec![8],
            block_size: DEFAULT_BLOCK_SIZE,
            cache: CachePolicy::default(),
            internal_layout: InternalLayout::default(),
            sync_on_insert: false,
        }
    }
}

impl TreeOptions {
    /// Options for a schema, defaults elsewhere.
    pub fn new(key_size: usize, field_sizes: &[usize], block_size: usize) -> Self {
        Self {
            key_size,
            field_sizes: field_sizes.to_vec(),
            block_size,
            ..Self::default()
        }
    }

    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Reads and parses a TOML options file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validates the options and derives leaf and internal geometry.
    pub fn dims(&self) -> Result<(BlockDims, BlockDims)> {
        if self.block_size < META_LEN || self.block_size > u32::MAX as usize {
            return Err(LeafError::Construction(format!(
                "block size {} outside {META_LEN}..={}",
                self.block_size,
                u32::MAX
            )));
        }
        if self.field_sizes.len() > usize::from(u16::MAX) {
            return Err(LeafError::Construction(format!(
                "{} fields exceed the limit of {}",
                self.field_sizes.len(),
                u16::MAX
            )));
        }
        let meta_len = TreeSchema::of(self).encoded_len();
        if meta_len > self.block_size {
            return Err(LeafError::Construction(format!(
                "metadata for {} fields needs {meta_len} bytes, blocks hold {}",
                self.field_sizes.len(),
                self.block_size
            )));
        }
        let leaf = BlockDims::leaf(self.block_size, self.key_size, &self.field_sizes)?;
        let internal =
            BlockDims::internal(self.internal_layout.mode(), self.block_size, self.key_size)?;
        for (kind, dims) in [("leaf", &leaf), ("internal", &internal)] {
            if dims.capacity() < 2 {
                return Err(LeafError::Construction(format!(
                    "{kind} blocks of {} bytes hold {} entries, at least 2 are needed to split",
                    self.block_size,
                    dims.capacity()
                )));
            }
        }
        Ok((leaf, internal))
    }
}
