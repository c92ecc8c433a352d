//! Bounds-checked walk over an MFT record's attribute chain

use crate::error::{IndexError, Result};
use crate::ntfs::structs::{AttributeHeader, ATTRIBUTE_HEADER_SIZE};
use byteorder::{ByteOrder, LittleEndian};

/// Cursor over an immutable record buffer.
///
/// Every read is checked against the end of the buffer; a header or an
/// advance that would leave it is reported as an invalid attribute instead
/// of touching memory past the record.
pub struct RecordCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RecordCursor<'a> {
    /// Start at `offset` inside `data` (usually the first attribute offset)
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Type code at the current position; the end marker may sit in the
    /// last few bytes of a record, too close to the end for a full header
    pub fn type_code_at(&self) -> Result<u32> {
        self.offset
            .checked_add(4)
            .and_then(|end| self.data.get(self.offset..end))
            .map(LittleEndian::read_u32)
            .ok_or_else(|| {
                IndexError::InvalidAttribute(
                    self.offset,
                    "attribute chain runs past record end without an end marker".to_string(),
                )
            })
    }

    /// Attribute header at the current position
    pub fn header_at(&self) -> Result<AttributeHeader> {
        self.data
            .get(self.offset..)
            .and_then(AttributeHeader::from_bytes)
            .ok_or_else(|| {
                IndexError::InvalidAttribute(
                    self.offset,
                    format!("header runs past record end ({} bytes)", self.data.len()),
                )
            })
    }

    /// The `length` bytes starting at the current position
    pub fn slice(&self, length: usize) -> Result<&'a [u8]> {
        self.offset
            .checked_add(length)
            .and_then(|end| self.data.get(self.offset..end))
            .ok_or_else(|| {
                IndexError::InvalidAttribute(
                    self.offset,
                    format!("attribute of {} bytes runs past record end", length),
                )
            })
    }

    /// Move past an attribute of `record_length` bytes
    pub fn advance_by(&mut self, record_length: usize) -> Result<()> {
        if record_length < ATTRIBUTE_HEADER_SIZE {
            return Err(IndexError::InvalidAttribute(
                self.offset,
                format!("record length {} is shorter than a header", record_length),
            ));
        }
        let next = self
            .offset
            .checked_add(record_length)
            .filter(|&next| next <= self.data.len())
            .ok_or_else(|| {
                IndexError::InvalidAttribute(
                    self.offset,
                    format!("advance of {} runs past record end", record_length),
                )
            })?;
        self.offset = next;
        Ok(())
    }
}
