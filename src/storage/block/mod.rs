#![forbid(unsafe_code)]
//! Fixed-size key blocks: geometry, records, and the byte codec.
//!
//! Layout of every block:
//!
//! ```text
//! +------+-----------+------------+------------------------+-----------------+-----------+
//! | mode | rec count | ptr count  | capacity record slots  | pointer slots   | extra ptr |
//! | u8   | u16 BE    | u16 BE     | key + fields, 0-filled | u64 BE, 0-filled| u64 BE    |
//! +------+-----------+------------+------------------------+-----------------+-----------+
//! ```
//!
//! The extra pointer is present only on blocks with `EXTRAPTR` set.

mod dims;
mod keyblock;
mod record;

pub use self::dims::{BlockDims, BlockMode, BLOCK_HEADER_LEN, POINTER_LEN};
pub use self::keyblock::KeyBlock;
pub use self::record::{conforms, Record};
