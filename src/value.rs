//! Property values: zero-copy views for decoding, owned values for encoding.

use bytes::BufMut;
use prost::encoding::{WireType, encode_key};

use crate::codec::{self, FieldReader};
use crate::error::{Error, Result};

const VALUE_STRING: u32 = 1;
const VALUE_FLOAT: u32 = 2;
const VALUE_DOUBLE: u32 = 3;
const VALUE_INT: u32 = 4;
const VALUE_UINT: u32 = 5;
const VALUE_SINT: u32 = 6;
const VALUE_BOOL: u32 = 7;

/// Discriminant of the scalar stored in a value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Float,
    Double,
    Int,
    Uint,
    Sint,
    Bool,
}

/// One decoded scalar, borrowing string data from the tile buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    String(&'a str),
    Float(f32),
    Double(f64),
    Int(i64),
    Uint(u64),
    Sint(i64),
    Bool(bool),
}

impl ValueRef<'_> {
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueRef::String(_) => ValueKind::String,
            ValueRef::Float(_) => ValueKind::Float,
            ValueRef::Double(_) => ValueKind::Double,
            ValueRef::Int(_) => ValueKind::Int,
            ValueRef::Uint(_) => ValueKind::Uint,
            ValueRef::Sint(_) => ValueKind::Sint,
            ValueRef::Bool(_) => ValueKind::Bool,
        }
    }
}

/// Typed view over a single length-delimited value record.
///
/// Holds the raw record bytes; nothing is parsed until an accessor is
/// called. Exactly one scalar field must be present in the record.
#[derive(Debug, Clone, Copy)]
pub struct ValueView<'a> {
    data: &'a [u8],
}

impl<'a> ValueView<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Raw bytes of the value record.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Which scalar this record holds.
    pub fn kind(&self) -> Result<ValueKind> {
        self.decode().map(|v| v.kind())
    }

    /// Decodes the record into its scalar.
    pub fn decode(&self) -> Result<ValueRef<'a>> {
        let mut r = FieldReader::new(self.data);
        let mut found: Option<ValueRef<'a>> = None;
        while let Some((field, wire_type)) = r.next_key()? {
            let value = match field {
                VALUE_STRING => {
                    let bytes = r.bytes(wire_type)?;
                    let s = std::str::from_utf8(bytes)
                        .map_err(|_| Error::Format("string value is not valid UTF-8".into()))?;
                    ValueRef::String(s)
                }
                VALUE_FLOAT => ValueRef::Float(f32::from_bits(r.fixed32(wire_type)?)),
                VALUE_DOUBLE => ValueRef::Double(f64::from_bits(r.fixed64(wire_type)?)),
                VALUE_INT => ValueRef::Int(r.varint(wire_type)? as i64),
                VALUE_UINT => ValueRef::Uint(r.varint(wire_type)?),
                VALUE_SINT => ValueRef::Sint(unzigzag64(r.varint(wire_type)?)),
                VALUE_BOOL => ValueRef::Bool(r.varint(wire_type)? != 0),
                _ => {
                    return Err(Error::Format(format!("unknown field {field} in value")));
                }
            };
            if found.is_some() {
                return Err(Error::Format("more than one scalar in value record".into()));
            }
            found = Some(value);
        }
        found.ok_or_else(|| Error::Format("value record holds no scalar".into()))
    }

    pub fn string_value(&self) -> Result<&'a str> {
        match self.decode()? {
            ValueRef::String(s) => Ok(s),
            _ => Err(Error::Type("value is not a string")),
        }
    }

    pub fn float_value(&self) -> Result<f32> {
        match self.decode()? {
            ValueRef::Float(v) => Ok(v),
            _ => Err(Error::Type("value is not a float")),
        }
    }

    pub fn double_value(&self) -> Result<f64> {
        match self.decode()? {
            ValueRef::Double(v) => Ok(v),
            _ => Err(Error::Type("value is not a double")),
        }
    }

    pub fn int_value(&self) -> Result<i64> {
        match self.decode()? {
            ValueRef::Int(v) => Ok(v),
            _ => Err(Error::Type("value is not an int")),
        }
    }

    pub fn uint_value(&self) -> Result<u64> {
        match self.decode()? {
            ValueRef::Uint(v) => Ok(v),
            _ => Err(Error::Type("value is not a uint")),
        }
    }

    pub fn sint_value(&self) -> Result<i64> {
        match self.decode()? {
            ValueRef::Sint(v) => Ok(v),
            _ => Err(Error::Type("value is not a sint")),
        }
    }

    pub fn bool_value(&self) -> Result<bool> {
        match self.decode()? {
            ValueRef::Bool(v) => Ok(v),
            _ => Err(Error::Type("value is not a bool")),
        }
    }
}

/// Owned, comparable value for the encoding side.
///
/// Floats are stored as native-endian bytes so that `Eq` and `Hash` hold
/// and values can be deduplicated through a hash table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    String(String),
    Float([u8; 4]),
    Double([u8; 8]),
    Int(i64),
    Uint(u64),
    SInt(i64),
    Bool(bool),
}

impl Value {
    /// Serializes the value record body.
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Value::String(s) => codec::put_bytes(buf, VALUE_STRING, s.as_bytes()),
            Value::Float(b) => {
                encode_key(VALUE_FLOAT, WireType::ThirtyTwoBit, buf);
                buf.put_u32_le(u32::from_ne_bytes(*b));
            }
            Value::Double(b) => {
                encode_key(VALUE_DOUBLE, WireType::SixtyFourBit, buf);
                buf.put_u64_le(u64::from_ne_bytes(*b));
            }
            Value::Int(v) => codec::put_varint(buf, VALUE_INT, *v as u64),
            Value::Uint(v) => codec::put_varint(buf, VALUE_UINT, *v),
            Value::SInt(v) => codec::put_varint(buf, VALUE_SINT, zigzag64(*v)),
            Value::Bool(v) => codec::put_varint(buf, VALUE_BOOL, *v as u64),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v as u64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        if v >= 0 { Value::Uint(v as u64) } else { Value::SInt(v) }
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        if v >= 0 {
            Value::Uint(v as u64)
        } else {
            Value::SInt(v as i64)
        }
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.to_ne_bytes())
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v.to_ne_bytes())
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::String(s) => Value::String(s.to_string()),
            ValueRef::Float(f) => Value::Float(f.to_ne_bytes()),
            ValueRef::Double(d) => Value::Double(d.to_ne_bytes()),
            ValueRef::Int(i) => Value::Int(i),
            ValueRef::Uint(u) => Value::Uint(u),
            ValueRef::Sint(s) => Value::SInt(s),
            ValueRef::Bool(b) => Value::Bool(b),
        }
    }
}

/// zig-zag encoding
///
/// See: https://protobuf.dev/programming-guides/encoding/#signed-ints
#[inline]
fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// zig-zag decoding
#[inline]
fn unzigzag64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ (-((v & 1) as i64))
}
