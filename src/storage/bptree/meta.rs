use std::ops::Range;

use tracing::trace;

use crate::error::{LeafError, Result};
use crate::primitives::bytes::ord::{
    get_u16_be, get_u32_be, get_u64_be, put_u16_be, put_u32_be, put_u64_be,
};
use crate::primitives::store::BlockStore;
use crate::storage::block::BlockMode;

use super::options::{InternalLayout, TreeOptions};

const META_HEIGHT: Range<usize> = 0..4;
const META_ROOT: Range<usize> = 4..12;
const META_ENTRIES: Range<usize> = 12..20;
const META_BLOCK_SIZE: Range<usize> = 20..24;
const META_KEY_SIZE: Range<usize> = 24..28;
const META_LAYOUT: usize = 28;
const META_FIELD_COUNT: Range<usize> = 29..31;
const FIELD_WIDTH_LEN: usize = 4;

/// Fixed part of block 0; field widths follow it, then zero padding.
pub const META_LEN: usize = META_FIELD_COUNT.end;

/// Metadata always lives in the first block.
pub const META_OFFSET: u64 = 0;

/// Record and node shape a tree file was created with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeSchema {
    /// Width of every key in bytes.
    pub key_size: usize,
    /// Widths of the fields stored with each key.
    pub field_sizes: Vec<usize>,
    /// Shape of internal nodes.
    pub internal_layout: InternalLayout,
}

impl TreeSchema {
    /// Schema described by `options`.
    pub fn of(options: &TreeOptions) -> Self {
        Self {
            key_size: options.key_size,
            field_sizes: options.field_sizes.clone(),
            internal_layout: options.internal_layout,
        }
    }

    /// Bytes of block 0 the metadata for this schema occupies.
    pub fn encoded_len(&self) -> usize {
        META_LEN + FIELD_WIDTH_LEN * self.field_sizes.len()
    }

    fn encode_into(&self, buf: &mut [u8]) {
        put_u32_be(&mut buf[META_KEY_SIZE], self.key_size as u32);
        buf[META_LAYOUT] = self.internal_layout.mode().bits();
        put_u16_be(&mut buf[META_FIELD_COUNT], self.field_sizes.len() as u16);
        for (i, &width) in self.field_sizes.iter().enumerate() {
            let at = META_LEN + i * FIELD_WIDTH_LEN;
            put_u32_be(&mut buf[at..at + FIELD_WIDTH_LEN], width as u32);
        }
    }

    fn decode_from(bytes: &[u8]) -> Result<Self> {
        let mode = BlockMode::from_bits(bytes[META_LAYOUT]);
        let internal_layout = mode.and_then(InternalLayout::from_mode).ok_or_else(|| {
            LeafError::corruption(
                META_OFFSET,
                format!("unknown internal layout {:#04x}", bytes[META_LAYOUT]),
            )
        })?;
        let count = usize::from(get_u16_be(&bytes[META_FIELD_COUNT]));
        let widths = bytes
            .get(META_LEN..META_LEN + count * FIELD_WIDTH_LEN)
            .ok_or_else(|| {
                LeafError::corruption(META_OFFSET, format!("{count} field widths do not fit block 0"))
            })?;
        Ok(Self {
            key_size: get_u32_be(&bytes[META_KEY_SIZE]) as usize,
            field_sizes: widths
                .chunks_exact(FIELD_WIDTH_LEN)
                .map(|width| get_u32_be(width) as usize)
                .collect(),
            internal_layout,
        })
    }
}

/// Tree height, root offset, entry count and schema persisted in block 0.
///
/// Every mutation rewrites block 0 before returning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeMetadata {
    height: u32,
    root: u64,
    entries: u64,
    block_size: u32,
    schema: TreeSchema,
}

impl TreeMetadata {
    /// Metadata for a tree whose only block is the leaf at `root`.
    pub fn new(block_size: u32, root: u64, schema: TreeSchema) -> Self {
        Self {
            height: 0,
            root,
            entries: 0,
            block_size,
            schema,
        }
    }

    /// Levels above the leaf level.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Offset of the root block.
    pub fn root(&self) -> u64 {
        self.root
    }

    /// Records stored in the tree.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Block size recorded at creation.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Schema recorded at creation.
    pub fn schema(&self) -> &TreeSchema {
        &self.schema
    }

    /// Fails with `Construction` unless the file was created with `expected`.
    pub fn check_schema(&self, expected: &TreeSchema) -> Result<()> {
        if &self.schema == expected {
            return Ok(());
        }
        Err(LeafError::Construction(format!(
            "file was created with key size {}, fields {:?} and {:?} internal nodes, opened with key size {}, fields {:?} and {:?} internal nodes",
            self.schema.key_size,
            self.schema.field_sizes,
            self.schema.internal_layout,
            expected.key_size,
            expected.field_sizes,
            expected.internal_layout,
        )))
    }

    /// Encodes block 0.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.block_size as usize];
        put_u32_be(&mut buf[META_HEIGHT], self.height);
        put_u64_be(&mut buf[META_ROOT], self.root);
        put_u64_be(&mut buf[META_ENTRIES], self.entries);
        put_u32_be(&mut buf[META_BLOCK_SIZE], self.block_size);
        self.schema.encode_into(&mut buf);
        buf
    }

    /// Decodes block 0 and checks it against the file it came from.
    pub fn decode(bytes: &[u8], block_size: u32, file_size: u64) -> Result<Self> {
        if bytes.len() < META_LEN {
            return Err(LeafError::corruption(META_OFFSET, "metadata block truncated"));
        }
        let stored_block_size = get_u32_be(&bytes[META_BLOCK_SIZE]);
        if stored_block_size != 0 && stored_block_size != block_size {
            return Err(LeafError::Construction(format!(
                "file was created with {stored_block_size} byte blocks, opened with {block_size}"
            )));
        }
        let meta = Self {
            height: get_u32_be(&bytes[META_HEIGHT]),
            root: get_u64_be(&bytes[META_ROOT]),
            entries: get_u64_be(&bytes[META_ENTRIES]),
            block_size,
            schema: TreeSchema::decode_from(bytes)?,
        };
        let bs = u64::from(block_size);
        if meta.root == META_OFFSET || meta.root % bs != 0 || meta.root + bs > file_size {
            return Err(LeafError::corruption(
                META_OFFSET,
                format!("root offset {} outside file of {file_size} bytes", meta.root),
            ));
        }
        Ok(meta)
    }

    /// Reads block 0 from `store`.
    pub fn load(store: &mut BlockStore, block_size: u32) -> Result<Self> {
        let bytes = store.read_block(META_OFFSET, block_size as usize)?;
        Self::decode(&bytes, block_size, store.size())
    }

    /// Writes block 0 to `store`.
    pub fn write(&self, store: &mut BlockStore) -> Result<()> {
        store.write_block(META_OFFSET, &self.encode())
    }

    /// Counts one more record and, when the root split, moves to `new_root`
    /// one level up, all in a single write of block 0.
    ///
    /// `self` is left unchanged when the write fails.
    pub fn record_insert(&mut self, store: &mut BlockStore, new_root: Option<u64>) -> Result<()> {
        let mut next = self.clone();
        next.entries += 1;
        if let Some(root) = new_root {
            next.root = root;
            next.height += 1;
            trace!(root, height = next.height, "bptree.meta.grow");
        }
        next.write(store)?;
        *self = next;
        Ok(())
    }

    /// Updates the height and persists it.
    pub fn set_height(&mut self, store: &mut BlockStore, height: u32) -> Result<()> {
        self.height = height;
        trace!(height, "bptree.meta.set_height");
        self.write(store)
    }

    /// Updates the root offset and persists it.
    pub fn set_root(&mut self, store: &mut BlockStore, root: u64) -> Result<()> {
        self.root = root;
        trace!(root, "bptree.meta.set_root");
        self.write(store)
    }

    /// Counts one more record and persists the total.
    pub fn inc_entries(&mut self, store: &mut BlockStore) -> Result<()> {
        self.entries += 1;
        self.write(store)
    }
}
