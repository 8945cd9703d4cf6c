//! Thin cursor over `prost::encoding` for reading and writing
//! length-prefixed TLV records without copying payload bytes.
//!
//! The varint and field-key wire logic lives in prost; this module only
//! adds lifetime-preserving sub-slice reads over a borrowed buffer.

use bytes::Buf;
use prost::encoding::{WireType, decode_key, decode_varint, encode_key, encode_varint};

use crate::error::{Error, Result};

/// Forward cursor over the fields of one TLV record.
///
/// Length-delimited payloads are returned as sub-slices of the source
/// buffer, so everything read through this cursor keeps the `'a` lifetime.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Remaining unread bytes, starting at the next field key.
    pub(crate) fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// Reads the next field key, or `None` at the end of the record.
    pub(crate) fn next_key(&mut self) -> Result<Option<(u32, WireType)>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let (field, wire_type) = decode_key(&mut self.buf)?;
        Ok(Some((field, wire_type)))
    }

    /// Reads a varint payload.
    pub(crate) fn varint(&mut self, wire_type: WireType) -> Result<u64> {
        if wire_type != WireType::Varint {
            return Err(wire_type_error(wire_type, "varint"));
        }
        Ok(decode_varint(&mut self.buf)?)
    }

    /// Reads a length-delimited payload as a sub-slice of the source buffer.
    pub(crate) fn bytes(&mut self, wire_type: WireType) -> Result<&'a [u8]> {
        if wire_type != WireType::LengthDelimited {
            return Err(wire_type_error(wire_type, "length-delimited"));
        }
        let len = decode_varint(&mut self.buf)?;
        if len > self.buf.len() as u64 {
            return Err(Error::Format(format!(
                "length-delimited field of {len} bytes exceeds remaining buffer"
            )));
        }
        let (payload, rest) = self.buf.split_at(len as usize);
        self.buf = rest;
        Ok(payload)
    }

    /// Reads a fixed 32-bit little-endian payload.
    pub(crate) fn fixed32(&mut self, wire_type: WireType) -> Result<u32> {
        if wire_type != WireType::ThirtyTwoBit {
            return Err(wire_type_error(wire_type, "fixed 32-bit"));
        }
        if self.buf.len() < 4 {
            return Err(Error::Format("truncated fixed-width field".into()));
        }
        Ok(self.buf.get_u32_le())
    }

    /// Reads a fixed 64-bit little-endian payload.
    pub(crate) fn fixed64(&mut self, wire_type: WireType) -> Result<u64> {
        if wire_type != WireType::SixtyFourBit {
            return Err(wire_type_error(wire_type, "fixed 64-bit"));
        }
        if self.buf.len() < 8 {
            return Err(Error::Format("truncated fixed-width field".into()));
        }
        Ok(self.buf.get_u64_le())
    }

    /// Skips one payload of the given wire type.
    pub(crate) fn skip(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                decode_varint(&mut self.buf)?;
            }
            WireType::LengthDelimited => {
                self.bytes(wire_type)?;
            }
            WireType::ThirtyTwoBit => self.advance(4)?,
            WireType::SixtyFourBit => self.advance(8)?,
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Error::Format("group wire types are not supported".into()));
            }
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        if self.buf.len() < n {
            return Err(Error::Format("truncated fixed-width field".into()));
        }
        self.buf.advance(n);
        Ok(())
    }
}

fn wire_type_error(found: WireType, expected: &str) -> Error {
    Error::Format(format!("expected {expected} field, found wire type {found:?}"))
}

/// Iterator over the varints of a packed repeated field.
pub(crate) struct PackedVarints<'a> {
    buf: &'a [u8],
}

impl<'a> PackedVarints<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn next_varint(&mut self) -> Option<Result<u64>> {
        if self.buf.is_empty() {
            return None;
        }
        Some(decode_varint(&mut self.buf).map_err(Error::from))
    }
}

/// Appends a length-delimited field.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, field: u32, payload: &[u8]) {
    encode_key(field, WireType::LengthDelimited, buf);
    encode_varint(payload.len() as u64, buf);
    buf.extend_from_slice(payload);
}

/// Appends a varint field.
pub(crate) fn put_varint(buf: &mut Vec<u8>, field: u32, value: u64) {
    encode_key(field, WireType::Varint, buf);
    encode_varint(value, buf);
}

/// Appends a packed repeated uint32 field. Empty slices write nothing.
pub(crate) fn put_packed_u32(buf: &mut Vec<u8>, field: u32, values: &[u32]) {
    if values.is_empty() {
        return;
    }
    let len: usize = values
        .iter()
        .map(|&v| prost::encoding::encoded_len_varint(v as u64))
        .sum();
    encode_key(field, WireType::LengthDelimited, buf);
    encode_varint(len as u64, buf);
    for &v in values {
        encode_varint(v as u64, buf);
    }
}
