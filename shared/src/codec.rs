//! Schema-driven binary codec.
//!
//! A message is encoded as its one-byte id followed by every declared field in
//! declaration order. Numbers are fixed-width little-endian, strings and arrays
//! carry a u16 length prefix, structs are written field by field without an id.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const INITIAL_BUFFER_SIZE: usize = 256;

/// Delivery class a message type is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Ordered and retransmitted.
    Reliable,
    /// Unordered, never retransmitted.
    Unreliable,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Reliable => "reliable",
            Channel::Unreliable => "unreliable",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "reliable" => Some(Channel::Reliable),
            "unreliable" => Some(Channel::Unreliable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
    Bool,
    String,
    Array(&'static FieldType),
    Struct(&'static [Field]),
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::U8 => "u8",
            FieldType::U16 => "u16",
            FieldType::U32 => "u32",
            FieldType::I8 => "i8",
            FieldType::I16 => "i16",
            FieldType::I32 => "i32",
            FieldType::F32 => "f32",
            FieldType::F64 => "f64",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Array(_) => "array",
            FieldType::Struct(_) => "struct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
}

/// Static description of one message type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageDescriptor {
    pub name: &'static str,
    pub id: u8,
    pub channel: Channel,
    pub fields: &'static [Field],
}

/// Untyped field value, the schema-level view of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<Value>),
    Struct(Vec<Value>),
}

impl Value {
    fn describe(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("message id {id} declared by both {first} and {second}")]
    DuplicateId {
        id: u8,
        first: &'static str,
        second: &'static str,
    },
    #[error("message name {0} declared twice")]
    DuplicateName(&'static str),
    #[error("field {field} declared twice in {message}")]
    DuplicateField {
        message: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("no message declared with id {0}")]
    UnknownMessageType(u8),
    #[error("{message}.{field}: expected {expected}, got {found}")]
    TypeMismatch {
        message: &'static str,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{message}: expected {expected} fields, got {found}")]
    FieldCount {
        message: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{message}.{field}: length {len} does not fit a u16 prefix")]
    TooLong {
        message: &'static str,
        field: &'static str,
        len: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown message id {0}")]
    UnknownMessageId(u8),
    #[error("buffer truncated at offset {offset}: needed {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    #[error("{0} unread bytes after the last field")]
    TrailingBytes(usize),
    #[error("malformed {message}: {reason}")]
    Malformed {
        message: &'static str,
        reason: String,
    },
}

/// Growable little-endian writer. Capacity doubles when a write does not fit.
#[derive(Debug)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::with_capacity(INITIAL_BUFFER_SIZE)
    }
}

impl BinaryWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.max(1)),
        }
    }

    fn ensure(&mut self, bytes: usize) {
        let needed = self.buf.len() + bytes;
        if needed <= self.buf.capacity() {
            return;
        }
        let mut new_capacity = self.buf.capacity().max(1) * 2;
        while new_capacity < needed {
            new_capacity *= 2;
        }
        self.buf.reserve_exact(new_capacity - self.buf.len());
    }

    fn put(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    pub fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    pub fn i8(&mut self, v: i8) {
        self.put(&v.to_le_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.put(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.put(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.put(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.put(&v.to_le_bytes());
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    /// Writes a u16 length prefix and the UTF-8 bytes. Callers check the length.
    pub fn string(&mut self, v: &str) {
        self.u16(v.len() as u16);
        self.put(v.as_bytes());
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn i8(&mut self) -> Result<i8, DecodeError> {
        self.array().map(i8::from_le_bytes)
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        self.array().map(i16::from_le_bytes)
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        self.array().map(f32::from_le_bytes)
    }

    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        self.array().map(f64::from_le_bytes)
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// Validated id lookup over a static descriptor list.
#[derive(Debug, Clone)]
pub struct Schema {
    descriptors: &'static [MessageDescriptor],
    by_id: HashMap<u8, usize>,
}

impl Schema {
    pub fn new(descriptors: &'static [MessageDescriptor]) -> Result<Self, SchemaError> {
        let mut by_id = HashMap::new();
        let mut names = HashSet::new();

        for (index, descriptor) in descriptors.iter().enumerate() {
            if let Some(&previous) = by_id.get(&descriptor.id) {
                let previous: &MessageDescriptor = &descriptors[previous];
                return Err(SchemaError::DuplicateId {
                    id: descriptor.id,
                    first: previous.name,
                    second: descriptor.name,
                });
            }
            if !names.insert(descriptor.name) {
                return Err(SchemaError::DuplicateName(descriptor.name));
            }
            check_field_names(descriptor.name, descriptor.fields)?;

            by_id.insert(descriptor.id, index);
        }

        Ok(Self { descriptors, by_id })
    }

    pub fn descriptors(&self) -> &'static [MessageDescriptor] {
        self.descriptors
    }

    pub fn by_id(&self, id: u8) -> Option<&'static MessageDescriptor> {
        let descriptors = self.descriptors;
        self.by_id.get(&id).map(|&i| &descriptors[i])
    }

    /// Writes the id byte and every field of message `id` into `writer`.
    pub fn encode_values(
        &self,
        id: u8,
        values: &[Value],
        writer: &mut BinaryWriter,
    ) -> Result<(), EncodeError> {
        let descriptor = self.by_id(id).ok_or(EncodeError::UnknownMessageType(id))?;

        writer.u8(descriptor.id);
        write_fields(descriptor.name, descriptor.fields, values, writer)
    }

    /// Reads one complete message. Unread bytes after the last field are an error.
    pub fn decode_values(
        &self,
        data: &[u8],
    ) -> Result<(&'static MessageDescriptor, Vec<Value>), DecodeError> {
        let mut reader = BinaryReader::new(data);
        let id = reader.u8()?;
        let descriptor = self.by_id(id).ok_or(DecodeError::UnknownMessageId(id))?;

        let values = read_fields(descriptor.fields, &mut reader)?;
        if reader.remaining() > 0 {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        Ok((descriptor, values))
    }
}

fn check_field_names(message: &'static str, fields: &'static [Field]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name) {
            return Err(SchemaError::DuplicateField {
                message,
                field: field.name,
            });
        }
        let mut ty = field.ty;
        while let FieldType::Array(element) = ty {
            ty = *element;
        }
        if let FieldType::Struct(inner) = ty {
            check_field_names(message, inner)?;
        }
    }
    Ok(())
}

fn write_fields(
    message: &'static str,
    fields: &'static [Field],
    values: &[Value],
    writer: &mut BinaryWriter,
) -> Result<(), EncodeError> {
    if fields.len() != values.len() {
        return Err(EncodeError::FieldCount {
            message,
            expected: fields.len(),
            found: values.len(),
        });
    }
    for (field, value) in fields.iter().zip(values) {
        write_value(message, field.name, &field.ty, value, writer)?;
    }
    Ok(())
}

fn write_value(
    message: &'static str,
    field: &'static str,
    ty: &FieldType,
    value: &Value,
    writer: &mut BinaryWriter,
) -> Result<(), EncodeError> {
    match (ty, value) {
        (FieldType::U8, Value::U8(v)) => writer.u8(*v),
        (FieldType::U16, Value::U16(v)) => writer.u16(*v),
        (FieldType::U32, Value::U32(v)) => writer.u32(*v),
        (FieldType::I8, Value::I8(v)) => writer.i8(*v),
        (FieldType::I16, Value::I16(v)) => writer.i16(*v),
        (FieldType::I32, Value::I32(v)) => writer.i32(*v),
        (FieldType::F32, Value::F32(v)) => writer.f32(*v),
        (FieldType::F64, Value::F64(v)) => writer.f64(*v),
        (FieldType::Bool, Value::Bool(v)) => writer.bool(*v),
        (FieldType::String, Value::String(v)) => {
            check_prefix(message, field, v.len())?;
            writer.string(v);
        }
        (FieldType::Array(element), Value::Array(items)) => {
            check_prefix(message, field, items.len())?;
            writer.u16(items.len() as u16);
            for item in items {
                write_value(message, field, element, item, writer)?;
            }
        }
        (FieldType::Struct(fields), Value::Struct(values)) => {
            write_fields(message, fields, values, writer)?;
        }
        (ty, value) => {
            return Err(EncodeError::TypeMismatch {
                message,
                field,
                expected: ty.describe(),
                found: value.describe(),
            })
        }
    }
    Ok(())
}

fn check_prefix(message: &'static str, field: &'static str, len: usize) -> Result<(), EncodeError> {
    if len > u16::MAX as usize {
        return Err(EncodeError::TooLong {
            message,
            field,
            len,
        });
    }
    Ok(())
}

fn read_fields(
    fields: &'static [Field],
    reader: &mut BinaryReader<'_>,
) -> Result<Vec<Value>, DecodeError> {
    fields.iter().map(|f| read_value(&f.ty, reader)).collect()
}

fn read_value(ty: &FieldType, reader: &mut BinaryReader<'_>) -> Result<Value, DecodeError> {
    Ok(match ty {
        FieldType::U8 => Value::U8(reader.u8()?),
        FieldType::U16 => Value::U16(reader.u16()?),
        FieldType::U32 => Value::U32(reader.u32()?),
        FieldType::I8 => Value::I8(reader.i8()?),
        FieldType::I16 => Value::I16(reader.i16()?),
        FieldType::I32 => Value::I32(reader.i32()?),
        FieldType::F32 => Value::F32(reader.f32()?),
        FieldType::F64 => Value::F64(reader.f64()?),
        FieldType::Bool => Value::Bool(reader.bool()?),
        FieldType::String => Value::String(reader.string()?),
        FieldType::Array(element) => {
            let count = reader.u16()? as usize;
            let mut items = Vec::with_capacity(count.min(reader.remaining()));
            for _ in 0..count {
                items.push(read_value(element, reader)?);
            }
            Value::Array(items)
        }
        FieldType::Struct(fields) => Value::Struct(read_fields(fields, reader)?),
    })
}

/// A closed message set described by a static schema.
pub trait WireMessage: Sized {
    fn schema() -> &'static [MessageDescriptor];

    /// Wire id of this variant.
    fn id(&self) -> u8;

    /// Field values in declared order.
    fn to_values(&self) -> Vec<Value>;

    /// Builds the variant for `descriptor.id` from decoded values.
    fn from_values(descriptor: &'static MessageDescriptor, values: Vec<Value>)
        -> Result<Self, DecodeError>;
}

/// Encoder/decoder for one message set.
///
/// The scratch buffer is reused across `encode` calls and the returned bytes are
/// an owned copy, so one codec must not be shared between concurrent senders.
pub struct Codec<M> {
    schema: Schema,
    writer: BinaryWriter,
    _message: PhantomData<fn() -> M>,
}

impl<M: WireMessage> Codec<M> {
    pub fn new() -> Result<Self, SchemaError> {
        Ok(Self {
            schema: Schema::new(M::schema())?,
            writer: BinaryWriter::default(),
            _message: PhantomData,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn encode(&mut self, message: &M) -> Result<Vec<u8>, EncodeError> {
        self.writer.reset();
        self.schema
            .encode_values(message.id(), &message.to_values(), &mut self.writer)?;
        Ok(self.writer.as_slice().to_vec())
    }

    pub fn decode(&self, data: &[u8]) -> Result<M, DecodeError> {
        let (descriptor, values) = self.schema.decode_values(data)?;
        M::from_values(descriptor, values)
    }

    pub fn channel_for(&self, message: &M) -> Result<Channel, EncodeError> {
        let id = message.id();
        self.schema
            .by_id(id)
            .map(|d| d.channel)
            .ok_or(EncodeError::UnknownMessageType(id))
    }
}

/// Conversion between a Rust field type and its schema `Value`.
pub trait FieldValue: Sized {
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! primitive_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

primitive_field_value! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => String,
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

/// Pulls typed fields out of a decoded value list in declared order.
pub struct FieldReader {
    message: &'static str,
    values: std::vec::IntoIter<Value>,
}

impl FieldReader {
    pub fn new(message: &'static str, values: Vec<Value>) -> Self {
        Self {
            message,
            values: values.into_iter(),
        }
    }

    pub fn next<T: FieldValue>(&mut self, field: &str) -> Result<T, DecodeError> {
        let value = self.values.next().ok_or_else(|| DecodeError::Malformed {
            message: self.message,
            reason: format!("missing field {field}"),
        })?;
        T::from_value(value).ok_or_else(|| DecodeError::Malformed {
            message: self.message,
            reason: format!("field {field} has the wrong type"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static POINT: FieldType = FieldType::Struct(&[
        Field {
            name: "x",
            ty: FieldType::I16,
        },
        Field {
            name: "y",
            ty: FieldType::I16,
        },
    ]);

    static TEST_SCHEMA: &[MessageDescriptor] = &[
        MessageDescriptor {
            name: "Hello",
            id: 7,
            channel: Channel::Reliable,
            fields: &[
                Field {
                    name: "name",
                    ty: FieldType::String,
                },
                Field {
                    name: "flag",
                    ty: FieldType::Bool,
                },
            ],
        },
        MessageDescriptor {
            name: "Path",
            id: 9,
            channel: Channel::Unreliable,
            fields: &[
                Field {
                    name: "scale",
                    ty: FieldType::F64,
                },
                Field {
                    name: "points",
                    ty: FieldType::Array(&POINT),
                },
            ],
        },
    ];

    static DUPLICATE_IDS: &[MessageDescriptor] = &[
        MessageDescriptor {
            name: "A",
            id: 1,
            channel: Channel::Reliable,
            fields: &[],
        },
        MessageDescriptor {
            name: "B",
            id: 1,
            channel: Channel::Reliable,
            fields: &[],
        },
    ];

    static DUPLICATE_FIELDS: &[MessageDescriptor] = &[MessageDescriptor {
        name: "A",
        id: 1,
        channel: Channel::Reliable,
        fields: &[
            Field {
                name: "x",
                ty: FieldType::U8,
            },
            Field {
                name: "x",
                ty: FieldType::U16,
            },
        ],
    }];

    fn point(x: i16, y: i16) -> Value {
        Value::Struct(vec![Value::I16(x), Value::I16(y)])
    }

    #[test]
    fn test_schema_rejects_duplicate_ids() {
        let err = Schema::new(DUPLICATE_IDS).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateId {
                id: 1,
                first: "A",
                second: "B"
            }
        );
    }

    #[test]
    fn test_schema_rejects_duplicate_fields() {
        let err = Schema::new(DUPLICATE_FIELDS).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                message: "A",
                field: "x"
            }
        );
    }

    #[test]
    fn test_string_layout() {
        let schema = Schema::new(TEST_SCHEMA).unwrap();
        let mut writer = BinaryWriter::default();
        schema
            .encode_values(
                7,
                &[Value::String("hé".to_string()), Value::Bool(true)],
                &mut writer,
            )
            .unwrap();

        // id, u16 byte length (é is two bytes), utf-8 bytes, bool
        assert_eq!(writer.as_slice(), &[7, 3, 0, b'h', 0xc3, 0xa9, 1]);
    }

    #[test]
    fn test_array_of_structs_layout() {
        let schema = Schema::new(TEST_SCHEMA).unwrap();
        let mut writer = BinaryWriter::default();
        let values = vec![
            Value::F64(0.5),
            Value::Array(vec![point(1, -1), point(256, 2)]),
        ];
        schema.encode_values(9, &values, &mut writer).unwrap();

        let bytes = writer.as_slice();
        assert_eq!(bytes[0], 9);
        assert_eq!(&bytes[1..9], &0.5f64.to_le_bytes());
        assert_eq!(&bytes[9..11], &[2, 0]);
        assert_eq!(&bytes[11..15], &[1, 0, 0xff, 0xff]);
        assert_eq!(&bytes[15..19], &[0, 1, 2, 0]);

        let (descriptor, decoded) = schema.decode_values(bytes).unwrap();
        assert_eq!(descriptor.name, "Path");
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_type_mismatch_is_an_encode_error() {
        let schema = Schema::new(TEST_SCHEMA).unwrap();
        let mut writer = BinaryWriter::default();
        let err = schema
            .encode_values(
                7,
                &[Value::U32(1), Value::Bool(false)],
                &mut writer,
            )
            .unwrap_err();

        assert_eq!(
            err,
            EncodeError::TypeMismatch {
                message: "Hello",
                field: "name",
                expected: "string",
                found: "u32"
            }
        );
    }

    #[test]
    fn test_unknown_type_is_an_encode_error() {
        let schema = Schema::new(TEST_SCHEMA).unwrap();
        let mut writer = BinaryWriter::default();
        let err = schema.encode_values(3, &[], &mut writer).unwrap_err();
        assert_eq!(err, EncodeError::UnknownMessageType(3));
        assert!(writer.as_slice().is_empty());
    }

    #[test]
    fn test_oversized_string_is_rejected() {
        let schema = Schema::new(TEST_SCHEMA).unwrap();
        let mut writer = BinaryWriter::default();
        let long = "x".repeat(u16::MAX as usize + 1);
        let err = schema
            .encode_values(7, &[Value::String(long), Value::Bool(true)], &mut writer)
            .unwrap_err();
        assert!(matches!(err, EncodeError::TooLong { field: "name", .. }));
    }

    #[test]
    fn test_decode_is_strict() {
        let schema = Schema::new(TEST_SCHEMA).unwrap();

        assert_eq!(
            schema.decode_values(&[]).unwrap_err(),
            DecodeError::UnexpectedEof {
                offset: 0,
                needed: 1
            }
        );
        assert_eq!(
            schema.decode_values(&[3]).unwrap_err(),
            DecodeError::UnknownMessageId(3)
        );
        // String claims 5 bytes but only 2 follow.
        assert!(matches!(
            schema.decode_values(&[7, 5, 0, b'h', b'i']).unwrap_err(),
            DecodeError::UnexpectedEof { .. }
        ));
        assert_eq!(
            schema.decode_values(&[7, 0, 0, 1, 42]).unwrap_err(),
            DecodeError::TrailingBytes(1)
        );
        assert_eq!(
            schema.decode_values(&[7, 1, 0, 0xff, 1]).unwrap_err(),
            DecodeError::InvalidUtf8
        );
    }

    #[test]
    fn test_writer_doubles_capacity() {
        let mut writer = BinaryWriter::with_capacity(4);
        writer.u32(1);
        assert_eq!(writer.capacity(), 4);
        writer.u8(2);
        assert!(writer.capacity() >= 8);
        writer.reset();
        assert!(writer.as_slice().is_empty());
    }

    #[test]
    fn test_channel_labels() {
        assert_eq!(Channel::from_label("reliable"), Some(Channel::Reliable));
        assert_eq!(Channel::from_label(Channel::Unreliable.label()), Some(Channel::Unreliable));
        assert_eq!(Channel::from_label("bulk"), None);
    }
}
