use std::fmt;

use crate::error::{LeafError, Result};

use super::dims::BlockDims;

/// A key followed by its fixed-width field payloads.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Record {
    key: Vec<u8>,
    fields: Vec<Vec<u8>>,
}

impl Record {
    /// Builds a record without checking it against any schema.
    pub fn new(key: impl Into<Vec<u8>>, fields: Vec<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }

    /// A record with no payload, as stored in internal blocks.
    pub fn key_only(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key, Vec::new())
    }

    /// Key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// All field payloads in schema order.
    pub fn fields(&self) -> &[Vec<u8>] {
        &self.fields
    }

    /// Field `i`, if the schema has one.
    pub fn field(&self, i: usize) -> Option<&[u8]> {
        self.fields.get(i).map(Vec::as_slice)
    }

    /// Splits the record into key and fields.
    pub fn into_parts(self) -> (Vec<u8>, Vec<Vec<u8>>) {
        (self.key, self.fields)
    }

    pub(crate) fn check(&self, dims: &BlockDims) -> Result<()> {
        if self.key.len() != dims.key_size() {
            return Err(LeafError::InvalidArgument(format!(
                "key is {} bytes, schema expects {}",
                self.key.len(),
                dims.key_size()
            )));
        }
        if !conforms(&self.fields, dims.field_sizes()) {
            return Err(LeafError::InvalidArgument(format!(
                "fields {:?} do not match schema {:?}",
                self.fields.iter().map(Vec::len).collect::<Vec<_>>(),
                dims.field_sizes()
            )));
        }
        Ok(())
    }

    pub(crate) fn encode_into(&self, dst: &mut [u8]) {
        let (key_dst, mut rest) = dst.split_at_mut(self.key.len());
        key_dst.copy_from_slice(&self.key);
        for field in &self.fields {
            let (head, tail) = rest.split_at_mut(field.len());
            head.copy_from_slice(field);
            rest = tail;
        }
    }

    pub(crate) fn decode(src: &[u8], dims: &BlockDims) -> Self {
        let (key, mut rest) = src.split_at(dims.key_size());
        let mut fields = Vec::with_capacity(dims.field_sizes().len());
        for &width in dims.field_sizes() {
            let (head, tail) = rest.split_at(width);
            fields.push(head.to_vec());
            rest = tail;
        }
        Self::new(key, fields)
    }
}

/// True when `fields` has exactly the widths in `sizes`.
pub fn conforms<F: AsRef<[u8]>>(fields: &[F], sizes: &[usize]) -> bool {
    fields.len() == sizes.len()
        && fields
            .iter()
            .zip(sizes)
            .all(|(field, &width)| field.as_ref().len() == width)
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({:02x?}", self.key)?;
        for field in &self.fields {
            write!(f, " {:02x?}", field)?;
        }
        f.write_str(")")
    }
}
