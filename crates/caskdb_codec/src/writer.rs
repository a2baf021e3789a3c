//! Field-set encoder.
//!
//! ## Wire format
//!
//! A field set is `u16 count` followed by `count` entries of
//! `u16 field_id` + one tagged value. Tagged values are:
//!
//! ```text
//! 0x00 null
//! 0x01 bool   | 1 byte
//! 0x02 int    | i64, little-endian
//! 0x03 float  | f64 bits, little-endian
//! 0x04 bytes  | u32 len + bytes
//! 0x05 text   | u32 len + UTF-8
//! 0x06 list   | u32 count + values
//! 0x07 map    | u32 count + (u32 key len + UTF-8 key + value)
//! 0x08 typed  | u16 type id + u32 body len + nested field set
//! ```
//!
//! Every value is skippable without a schema; that property is what makes
//! unknown field ids safe to ignore on decode.

use crate::error::{CodecError, CodecResult};
use crate::schema::Registry;
use crate::value::{TypedValue, Value};

/// Wire tag for a null value.
pub const TAG_NULL: u8 = 0x00;
/// Wire tag for a boolean.
pub const TAG_BOOL: u8 = 0x01;
/// Wire tag for an integer.
pub const TAG_INT: u8 = 0x02;
/// Wire tag for a float.
pub const TAG_FLOAT: u8 = 0x03;
/// Wire tag for a byte string.
pub const TAG_BYTES: u8 = 0x04;
/// Wire tag for a text string.
pub const TAG_TEXT: u8 = 0x05;
/// Wire tag for a list.
pub const TAG_LIST: u8 = 0x06;
/// Wire tag for a map.
pub const TAG_MAP: u8 = 0x07;
/// Wire tag for a nested typed value.
pub const TAG_TYPED: u8 = 0x08;

/// Returns the wire tag a value encodes with.
#[must_use]
pub fn value_tag(value: &Value) -> u8 {
    match value {
        Value::Null => TAG_NULL,
        Value::Bool(_) => TAG_BOOL,
        Value::Int(_) => TAG_INT,
        Value::Float(_) => TAG_FLOAT,
        Value::Bytes(_) => TAG_BYTES,
        Value::Text(_) => TAG_TEXT,
        Value::List(_) => TAG_LIST,
        Value::Map(_) => TAG_MAP,
        Value::Typed(_) => TAG_TYPED,
    }
}

/// Encodes a typed value's field set against its registered schema.
///
/// Only schema-declared fields present on the value are written, in field
/// id order. Fields on the value that the schema does not declare are
/// silently ignored.
pub fn encode_field_set(registry: &Registry, value: &TypedValue) -> CodecResult<Vec<u8>> {
    let schema = registry
        .schema(value.type_id)
        .ok_or(CodecError::UnknownType(value.type_id))?;

    let mut present = Vec::new();
    for (&field_id, &kind) in &schema.fields {
        let Some(field_value) = value.fields.get(&field_id) else {
            continue;
        };
        if !kind.admits(field_value) {
            return Err(CodecError::FieldKindMismatch {
                type_id: value.type_id,
                field_id,
                expected: kind,
                found: value_tag(field_value),
            });
        }
        present.push((field_id, field_value));
    }

    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&(present.len() as u16).to_le_bytes());
    for (field_id, field_value) in present {
        buf.extend_from_slice(&field_id.as_u16().to_le_bytes());
        write_value(&mut buf, registry, field_value)?;
    }

    Ok(buf)
}

fn write_value(buf: &mut Vec<u8>, registry: &Registry, value: &Value) -> CodecResult<()> {
    buf.push(value_tag(value));

    match value {
        Value::Null => {}
        Value::Bool(b) => buf.push(u8::from(*b)),
        Value::Int(n) => buf.extend_from_slice(&n.to_le_bytes()),
        Value::Float(f) => buf.extend_from_slice(&f.to_le_bytes()),
        Value::Bytes(b) => {
            buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::List(items) => {
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(buf, registry, item)?;
            }
        }
        Value::Map(entries) => {
            buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (key, item) in entries {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key.as_bytes());
                write_value(buf, registry, item)?;
            }
        }
        Value::Typed(nested) => {
            let body = encode_field_set(registry, nested)?;
            buf.extend_from_slice(&nested.type_id.as_u16().to_le_bytes());
            buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
            buf.extend_from_slice(&body);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldId, FieldKind, TypeId, TypeSchema};

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(
            TypeSchema::new(TypeId::new(1))
                .with_field(FieldId::new(0), FieldKind::Text)
                .with_field(FieldId::new(1), FieldKind::Int),
        )
        .unwrap();
        r
    }

    #[test]
    fn fields_written_in_id_order() {
        let r = registry();
        let value = TypedValue::new(TypeId::new(1))
            .with_field(FieldId::new(1), 7i64)
            .with_field(FieldId::new(0), "x");

        let bytes = r.encode(&value).unwrap();
        // count = 2, first entry is field 0
        assert_eq!(&bytes[0..2], &2u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &0u16.to_le_bytes());
    }

    #[test]
    fn undeclared_fields_ignored() {
        let r = registry();
        let value = TypedValue::new(TypeId::new(1))
            .with_field(FieldId::new(0), "x")
            .with_field(FieldId::new(9), 1i64);

        let bytes = r.encode(&value).unwrap();
        assert_eq!(&bytes[0..2], &1u16.to_le_bytes());
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let r = registry();
        let value = TypedValue::new(TypeId::new(1)).with_field(FieldId::new(1), "not an int");

        let err = r.encode(&value).unwrap_err();
        assert!(matches!(err, CodecError::FieldKindMismatch { .. }));
    }

    #[test]
    fn unregistered_type_is_an_error() {
        let r = registry();
        let value = TypedValue::new(TypeId::new(99));
        assert_eq!(r.encode(&value), Err(CodecError::UnknownType(TypeId::new(99))));
    }

    #[test]
    fn null_admitted_for_any_kind() {
        let r = registry();
        let value = TypedValue::new(TypeId::new(1)).with_field(FieldId::new(1), Value::Null);
        assert!(r.encode(&value).is_ok());
    }
}
