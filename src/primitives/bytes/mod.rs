#![forbid(unsafe_code)]
//! Fixed-width big-endian encoders and byte-string ordering shared by the block layer.

pub mod ord {
    //! Order-preserving encoders for integer fields and keys.
    //!
    //! The `put_*` and `get_*` helpers panic when the slice is shorter than
    //! the integer; block codecs always hand them fixed-width sub-slices.

    use core::cmp::Ordering;

    const U16_LEN: usize = core::mem::size_of::<u16>();
    const U32_LEN: usize = core::mem::size_of::<u32>();
    const U64_LEN: usize = core::mem::size_of::<u64>();

    /// Writes `v` big-endian into the first two bytes of `dst`.
    pub fn put_u16_be(dst: &mut [u8], v: u16) {
        assert!(dst.len() >= U16_LEN, "destination too small");
        dst[..U16_LEN].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u16 from the first two bytes of `src`.
    pub fn get_u16_be(src: &[u8]) -> u16 {
        let mut bytes = [0u8; U16_LEN];
        bytes.copy_from_slice(&src[..U16_LEN]);
        u16::from_be_bytes(bytes)
    }

    /// Writes `v` big-endian into the first four bytes of `dst`.
    pub fn put_u32_be(dst: &mut [u8], v: u32) {
        assert!(dst.len() >= U32_LEN, "destination too small");
        dst[..U32_LEN].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u32 from the first four bytes of `src`.
    pub fn get_u32_be(src: &[u8]) -> u32 {
        let mut bytes = [0u8; U32_LEN];
        bytes.copy_from_slice(&src[..U32_LEN]);
        u32::from_be_bytes(bytes)
    }

    /// Big-endian encoding for lexicographic order preservation.
    pub fn put_u64_be(dst: &mut [u8], v: u64) {
        assert!(dst.len() >= U64_LEN, "destination too small");
        dst[..U64_LEN].copy_from_slice(&v.to_be_bytes());
    }

    /// Decodes a u64 from big-endian byte order.
    pub fn get_u64_be(src: &[u8]) -> u64 {
        let mut bytes = [0u8; U64_LEN];
        bytes.copy_from_slice(&src[..U64_LEN]);
        u64::from_be_bytes(bytes)
    }

    /// Unsigned lexicographic comparison of two keys.
    #[inline]
    pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    /// Encodes `v` as a 4-byte key that sorts numerically.
    pub fn key_from_u32(v: u32) -> [u8; U32_LEN] {
        v.to_be_bytes()
    }

    /// Encodes `v` as an 8-byte key that sorts numerically.
    pub fn key_from_u64(v: u64) -> [u8; U64_LEN] {
        v.to_be_bytes()
    }
}
