use std::fmt;
use std::ops::BitOr;

use crate::error::{LeafError, Result};

/// Bytes taken by the block header: mode, record count, pointer count.
pub const BLOCK_HEADER_LEN: usize = 5;

/// Width of every child and sibling pointer.
pub const POINTER_LEN: usize = 8;

pub(crate) const MODE_OFFSET: usize = 0;
pub(crate) const RECORD_COUNT_OFFSET: usize = 1;
pub(crate) const POINTER_COUNT_OFFSET: usize = 3;

/// Bit flags fixing the shape of a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockMode(u8);

impl BlockMode {
    /// Block carries records with field payloads.
    pub const RECORDS: Self = Self(1);
    /// Block carries child pointers.
    pub const POINTERS: Self = Self(2);
    /// Block carries one trailing sibling pointer.
    pub const EXTRAPTR: Self = Self(4);
    /// One child pointer per record instead of `records + 1`.
    pub const EQUAPTRS: Self = Self(8);
    /// Keys within the block are strictly ascending.
    pub const NODUP: Self = Self(16);

    /// Leaf blocks: records threaded by the extra pointer.
    pub const LEAF: Self = Self(Self::RECORDS.0 | Self::EXTRAPTR.0);
    /// Internal blocks with one pointer per separator record.
    pub const INTERNAL_EQUAL: Self =
        Self(Self::POINTERS.0 | Self::EQUAPTRS.0 | Self::NODUP.0);
    /// Internal blocks with a leading pointer before the first separator.
    pub const INTERNAL_CLASSIC: Self = Self(Self::POINTERS.0 | Self::NODUP.0);

    const ALL: u8 = 0b1_1111;

    /// Raw flag byte as stored in the block header.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Parses a flag byte, rejecting unknown bits.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// True when every flag of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BlockMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(BlockMode, &str); 5] = [
            (BlockMode::RECORDS, "RECORDS"),
            (BlockMode::POINTERS, "POINTERS"),
            (BlockMode::EXTRAPTR, "EXTRAPTR"),
            (BlockMode::EQUAPTRS, "EQUAPTRS"),
            (BlockMode::NODUP, "NODUP"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("EMPTY")?;
        }
        Ok(())
    }
}

/// Validated geometry of one kind of block.
///
/// Built once per tree; every block of the same kind shares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDims {
    mode: BlockMode,
    block_size: usize,
    key_size: usize,
    field_sizes: Vec<usize>,
    record_size: usize,
    pointer_size: usize,
    capacity: usize,
    pointer_slots: usize,
}

impl BlockDims {
    /// Validates the combination and derives the record capacity.
    pub fn new(
        mode: BlockMode,
        block_size: usize,
        key_size: usize,
        field_sizes: &[usize],
        pointer_size: usize,
    ) -> Result<Self> {
        let fail = |msg: String| Err(LeafError::Construction(msg));
        if key_size == 0 {
            return fail("key size must be positive".into());
        }
        if field_sizes.contains(&0) {
            return fail("field sizes must be positive".into());
        }
        let has_records = mode.contains(BlockMode::RECORDS);
        let has_pointers = mode.contains(BlockMode::POINTERS);
        let has_extra = mode.contains(BlockMode::EXTRAPTR);
        if !has_records && !has_pointers {
            return fail(format!("mode {mode:?} holds neither records nor pointers"));
        }
        if mode.contains(BlockMode::EQUAPTRS) && !has_pointers {
            return fail(format!("mode {mode:?} sets EQUAPTRS without POINTERS"));
        }
        if has_extra && has_pointers {
            return fail(format!("mode {mode:?} mixes EXTRAPTR with child pointers"));
        }
        if !has_records && !field_sizes.is_empty() {
            return fail(format!("mode {mode:?} cannot carry field payloads"));
        }
        let record_size: usize = field_sizes.iter().sum();
        if record_size == 0 && pointer_size == 0 {
            return fail("record size and pointer size are both zero".into());
        }
        let needs_pointer = has_pointers || has_extra;
        if needs_pointer && pointer_size != POINTER_LEN {
            return fail(format!(
                "pointer size must be {POINTER_LEN} bytes, got {pointer_size}"
            ));
        }
        if !needs_pointer && pointer_size != 0 {
            return fail(format!("mode {mode:?} declares pointers it cannot store"));
        }

        let leading = if has_pointers && !mode.contains(BlockMode::EQUAPTRS) {
            pointer_size
        } else {
            0
        };
        let trailing = if has_extra { pointer_size } else { 0 };
        let per_slot = key_size + record_size + if has_pointers { pointer_size } else { 0 };
        let fixed = BLOCK_HEADER_LEN + leading + trailing;
        let capacity = block_size
            .checked_sub(fixed)
            .map(|room| room / per_slot)
            .unwrap_or(0)
            .min(u16::MAX as usize - 1);
        if capacity == 0 {
            return fail(format!(
                "block of {block_size} bytes too small for {} byte entries",
                per_slot
            ));
        }
        let pointer_slots = match (has_pointers, leading > 0) {
            (false, _) => 0,
            (true, true) => capacity + 1,
            (true, false) => capacity,
        };
        Ok(Self {
            mode,
            block_size,
            key_size,
            field_sizes: field_sizes.to_vec(),
            record_size,
            pointer_size,
            capacity,
            pointer_slots,
        })
    }

    /// Leaf geometry for a record schema.
    pub fn leaf(block_size: usize, key_size: usize, field_sizes: &[usize]) -> Result<Self> {
        Self::new(BlockMode::LEAF, block_size, key_size, field_sizes, POINTER_LEN)
    }

    /// Internal-node geometry for `mode`.
    pub fn internal(mode: BlockMode, block_size: usize, key_size: usize) -> Result<Self> {
        Self::new(mode, block_size, key_size, &[], POINTER_LEN)
    }

    /// Block shape flags.
    pub fn mode(&self) -> BlockMode {
        self.mode
    }

    /// Total serialized size of a block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Width of every key.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Widths of the record fields following the key.
    pub fn field_sizes(&self) -> &[usize] {
        &self.field_sizes
    }

    /// Sum of the field widths.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Width of a pointer, 0 when the block has none.
    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pointer slots in the pointer region.
    pub fn pointer_slots(&self) -> usize {
        self.pointer_slots
    }

    /// Bytes taken by one record slot.
    pub fn entry_size(&self) -> usize {
        self.key_size + self.record_size
    }

    /// True for blocks whose keys must be strictly ascending.
    pub fn unique_keys(&self) -> bool {
        self.mode.contains(BlockMode::NODUP)
    }

    /// True when the pointer count tracks the record count one to one.
    pub fn equal_pointers(&self) -> bool {
        self.mode.contains(BlockMode::EQUAPTRS)
    }

    pub(crate) fn pointer_region(&self) -> usize {
        BLOCK_HEADER_LEN + self.capacity * self.entry_size()
    }

    pub(crate) fn extra_region(&self) -> usize {
        self.pointer_region() + self.pointer_slots * self.pointer_size
    }
}
