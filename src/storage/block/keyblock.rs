use std::sync::Arc;

use crate::error::{LeafError, Result};
use crate::primitives::bytes::ord::{
    compare_keys, get_u16_be, get_u64_be, put_u16_be, put_u64_be,
};
use crate::primitives::store::BlockStore;

use super::dims::{
    BlockDims, BlockMode, MODE_OFFSET, POINTER_COUNT_OFFSET, RECORD_COUNT_OFFSET,
};
use super::record::Record;

/// In-memory image of one fixed-size block.
///
/// Records stay sorted by key. Duplicates, when allowed, are contiguous and
/// newer copies sit in front of older ones because [`KeyBlock::add`] inserts
/// before the first equal key.
#[derive(Clone, Debug)]
pub struct KeyBlock {
    dims: Arc<BlockDims>,
    offset: u64,
    records: Vec<Record>,
    pointers: Vec<u64>,
    extra: u64,
}

impl KeyBlock {
    /// Empty block bound to `offset`; nothing is written.
    pub fn new(dims: Arc<BlockDims>, offset: u64) -> Self {
        Self {
            records: Vec::with_capacity(dims.capacity()),
            pointers: Vec::with_capacity(dims.pointer_slots()),
            dims,
            offset,
            extra: 0,
        }
    }

    /// Appends a fresh block to `store` and returns its empty image.
    pub fn allocate(store: &mut BlockStore, dims: Arc<BlockDims>) -> Result<Self> {
        let offset = store.allocate(dims.block_size() as u64)?;
        Ok(Self::new(dims, offset))
    }

    /// Reads and decodes the block at `offset`.
    pub fn load(store: &mut BlockStore, dims: Arc<BlockDims>, offset: u64) -> Result<Self> {
        let bytes = store.read_block(offset, dims.block_size())?;
        Self::deserialize(dims, offset, &bytes)
    }

    /// Serializes the block to its offset.
    pub fn write(&self, store: &mut BlockStore) -> Result<()> {
        store.write_block(self.offset, &self.serialize())
    }

    /// File offset of the block.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Geometry shared by blocks of this kind.
    pub fn dims(&self) -> &Arc<BlockDims> {
        &self.dims
    }

    /// Shape flags.
    pub fn mode(&self) -> BlockMode {
        self.dims.mode()
    }

    /// Number of records held.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of child pointers held.
    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.dims.capacity()
    }

    /// True when another record would not fit.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.dims.capacity()
    }

    /// True when the block holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Record at `i`.
    pub fn record(&self, i: usize) -> Option<&Record> {
        self.records.get(i)
    }

    /// Child pointers in slot order.
    pub fn pointers(&self) -> &[u64] {
        &self.pointers
    }

    /// Child pointer at `i`.
    pub fn pointer(&self, i: usize) -> Option<u64> {
        self.pointers.get(i).copied()
    }

    /// Record at `i` with the pointers on its left and right.
    pub fn get(&self, i: usize) -> Option<(&Record, Option<u64>, Option<u64>)> {
        let record = self.records.get(i)?;
        Some((record, self.pointer(i), self.pointer(i + 1)))
    }

    /// Smallest key in the block.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.records.first().map(Record::key)
    }

    /// Largest key in the block.
    pub fn last_key(&self) -> Option<&[u8]> {
        self.records.last().map(Record::key)
    }

    /// Sibling pointer; `None` at the end of the chain.
    pub fn extra(&self) -> Option<u64> {
        (self.extra != 0).then_some(self.extra)
    }

    /// Replaces the sibling pointer.
    pub fn set_extra(&mut self, next: Option<u64>) -> Result<()> {
        if !self.mode().contains(BlockMode::EXTRAPTR) {
            return Err(LeafError::InvalidArgument(format!(
                "block at {} has no extra pointer slot",
                self.offset
            )));
        }
        self.extra = next.unwrap_or(0);
        Ok(())
    }

    /// Binary search for `key`.
    ///
    /// Returns `(i, true)` where `i` is the first record equal to `key`, or
    /// `(i, false)` where `i` is the insertion point.
    pub fn find(&self, key: &[u8]) -> (usize, bool) {
        let (mut lo, mut hi) = (0usize, self.records.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match compare_keys(self.records[mid].key(), key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    let mut first = mid;
                    while first > 0 && self.records[first - 1].key() == key {
                        first -= 1;
                    }
                    return (first, true);
                }
            }
        }
        (lo, false)
    }

    /// Number of records whose key equals `key`.
    pub fn count(&self, key: &[u8]) -> usize {
        let (start, found) = self.find(key);
        if !found {
            return 0;
        }
        self.records[start..]
            .iter()
            .take_while(|record| record.key() == key)
            .count()
    }

    /// Inserts `record` before any record with an equal key.
    pub fn add(&mut self, record: Record) -> Result<usize> {
        if self.is_full() {
            return Err(LeafError::Capacity(format!(
                "block at {} holds {} records",
                self.offset,
                self.records.len()
            )));
        }
        record.check(&self.dims)?;
        let (i, found) = self.find(record.key());
        if found && self.dims.unique_keys() {
            return Err(LeafError::InvalidArgument(format!(
                "duplicate key {:02x?} in block at {}",
                record.key(),
                self.offset
            )));
        }
        self.records.insert(i, record);
        Ok(i)
    }

    /// Pushes `record` after the last one; the key must not sort earlier.
    pub fn append(&mut self, record: Record) -> Result<()> {
        if self.is_full() {
            return Err(LeafError::Capacity(format!(
                "block at {} holds {} records",
                self.offset,
                self.records.len()
            )));
        }
        record.check(&self.dims)?;
        if let Some(last) = self.last_key() {
            let ordering = compare_keys(last, record.key());
            let in_order = if self.dims.unique_keys() {
                ordering.is_lt()
            } else {
                ordering.is_le()
            };
            if !in_order {
                return Err(LeafError::InvalidArgument(format!(
                    "append of {:02x?} after {:02x?} breaks key order",
                    record.key(),
                    last
                )));
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// Replaces the key of record `i`, keeping the block sorted.
    pub fn set_key(&mut self, i: usize, key: &[u8]) -> Result<()> {
        if i >= self.records.len() || key.len() != self.dims.key_size() {
            return Err(LeafError::InvalidArgument(format!(
                "cannot rekey slot {i} of block at {}",
                self.offset
            )));
        }
        let strict = self.dims.unique_keys();
        let fits = |a: &[u8], b: &[u8]| {
            let ordering = compare_keys(a, b);
            if strict {
                ordering.is_lt()
            } else {
                ordering.is_le()
            }
        };
        let after_prev = i == 0 || fits(self.records[i - 1].key(), key);
        let before_next = i + 1 >= self.records.len() || fits(key, self.records[i + 1].key());
        if !(after_prev && before_next) {
            return Err(LeafError::InvalidArgument(format!(
                "rekey of slot {i} breaks key order"
            )));
        }
        let (_, fields) = std::mem::replace(&mut self.records[i], Record::key_only(Vec::new()))
            .into_parts();
        self.records[i] = Record::new(key, fields);
        Ok(())
    }

    /// Removes the first record equal to `key`.
    pub fn remove(&mut self, key: &[u8]) -> Option<Record> {
        match self.find(key) {
            (i, true) => Some(self.records.remove(i)),
            _ => None,
        }
    }

    /// Removes the record at `i`.
    pub fn remove_at_index(&mut self, i: usize) -> Result<Record> {
        if i >= self.records.len() {
            return Err(LeafError::InvalidArgument(format!(
                "record index {i} out of range ({})",
                self.records.len()
            )));
        }
        Ok(self.records.remove(i))
    }

    /// Inserts a child pointer at slot `i`, shifting later slots right.
    pub fn insert_pointer(&mut self, i: usize, ptr: u64) -> Result<()> {
        self.require_pointers()?;
        if i > self.pointers.len() {
            return Err(LeafError::InvalidArgument(format!(
                "pointer index {i} out of range ({})",
                self.pointers.len()
            )));
        }
        if self.pointers.len() >= self.dims.pointer_slots() {
            return Err(LeafError::Capacity(format!(
                "block at {} holds {} pointers",
                self.offset,
                self.pointers.len()
            )));
        }
        self.pointers.insert(i, ptr);
        Ok(())
    }

    /// Removes the child pointer at slot `i`.
    pub fn remove_pointer(&mut self, i: usize) -> Result<u64> {
        self.require_pointers()?;
        if i >= self.pointers.len() {
            return Err(LeafError::InvalidArgument(format!(
                "pointer index {i} out of range ({})",
                self.pointers.len()
            )));
        }
        Ok(self.pointers.remove(i))
    }

    /// Overwrites the child pointer at slot `i`.
    pub fn set_pointer(&mut self, i: usize, ptr: u64) -> Result<()> {
        self.require_pointers()?;
        match self.pointers.get_mut(i) {
            Some(slot) => {
                *slot = ptr;
                Ok(())
            }
            None => Err(LeafError::InvalidArgument(format!(
                "pointer index {i} out of range ({})",
                self.pointers.len()
            ))),
        }
    }

    /// Empties the block, handing back its records and pointers.
    pub fn take_entries(&mut self) -> (Vec<Record>, Vec<u64>) {
        (
            std::mem::take(&mut self.records),
            std::mem::take(&mut self.pointers),
        )
    }

    fn require_pointers(&self) -> Result<()> {
        if self.mode().contains(BlockMode::POINTERS) {
            Ok(())
        } else {
            Err(LeafError::InvalidArgument(format!(
                "block at {} has no pointer slots",
                self.offset
            )))
        }
    }

    /// Encodes the block into exactly `block_size` bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let dims = &self.dims;
        let mut buf = vec![0u8; dims.block_size()];
        buf[MODE_OFFSET] = dims.mode().bits();
        put_u16_be(&mut buf[RECORD_COUNT_OFFSET..], self.records.len() as u16);
        put_u16_be(&mut buf[POINTER_COUNT_OFFSET..], self.pointers.len() as u16);

        let entry = dims.entry_size();
        let mut at = super::dims::BLOCK_HEADER_LEN;
        for record in &self.records {
            record.encode_into(&mut buf[at..at + entry]);
            at += entry;
        }

        let mut at = dims.pointer_region();
        for &ptr in &self.pointers {
            put_u64_be(&mut buf[at..], ptr);
            at += dims.pointer_size();
        }

        if dims.mode().contains(BlockMode::EXTRAPTR) {
            put_u64_be(&mut buf[dims.extra_region()..], self.extra);
        }
        buf
    }

    /// Decodes a block previously produced by [`KeyBlock::serialize`].
    pub fn deserialize(dims: Arc<BlockDims>, offset: u64, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != dims.block_size() {
            return Err(LeafError::corruption(
                offset,
                format!(
                    "block is {} bytes, expected {}",
                    bytes.len(),
                    dims.block_size()
                ),
            ));
        }
        let stored = bytes[MODE_OFFSET];
        if stored != dims.mode().bits() {
            return Err(LeafError::corruption(
                offset,
                format!(
                    "mode byte {stored:#04x} does not match expected {:?}",
                    dims.mode()
                ),
            ));
        }
        let record_count = get_u16_be(&bytes[RECORD_COUNT_OFFSET..]) as usize;
        let pointer_count = get_u16_be(&bytes[POINTER_COUNT_OFFSET..]) as usize;
        if record_count > dims.capacity() || pointer_count > dims.pointer_slots() {
            return Err(LeafError::corruption(
                offset,
                format!("counts {record_count}/{pointer_count} exceed block capacity"),
            ));
        }

        let mut block = Self::new(Arc::clone(&dims), offset);
        let entry = dims.entry_size();
        let mut at = super::dims::BLOCK_HEADER_LEN;
        for _ in 0..record_count {
            block
                .records
                .push(Record::decode(&bytes[at..at + entry], &dims));
            at += entry;
        }
        let mut at = dims.pointer_region();
        for _ in 0..pointer_count {
            block.pointers.push(get_u64_be(&bytes[at..]));
            at += dims.pointer_size();
        }
        if dims.mode().contains(BlockMode::EXTRAPTR) {
            block.extra = get_u64_be(&bytes[dims.extra_region()..]);
        }
        Ok(block)
    }
}
