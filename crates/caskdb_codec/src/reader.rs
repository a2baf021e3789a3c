//! Field-set decoder.
//!
//! Decoding applies the schema-evolution rules: a field id present in the
//! data but absent from the current schema is skipped over (every tagged
//! value is self-delimiting), and a declared field missing from the data
//! is filled with its kind's default. This is the sole mechanism for
//! adding fields without migrating old data.

use crate::error::{CodecError, CodecResult};
use crate::schema::{Registry, TypeId};
use crate::value::{TypedValue, Value};
use crate::writer::{
    TAG_BOOL, TAG_BYTES, TAG_FLOAT, TAG_INT, TAG_LIST, TAG_MAP, TAG_NULL, TAG_TEXT, TAG_TYPED,
};
use bytes::Buf;
use std::collections::BTreeMap;

/// Decodes a field set using the current schema for `type_id`.
pub fn decode_field_set(
    registry: &Registry,
    type_id: TypeId,
    bytes: &[u8],
) -> CodecResult<TypedValue> {
    let mut buf = bytes;
    let value = read_field_set(registry, type_id, &mut buf)?;
    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes(buf.remaining()));
    }
    Ok(value)
}

fn read_field_set(
    registry: &Registry,
    type_id: TypeId,
    buf: &mut &[u8],
) -> CodecResult<TypedValue> {
    let schema = registry
        .schema(type_id)
        .ok_or(CodecError::UnknownType(type_id))?;

    let count = take_u16(buf)?;
    let mut fields = BTreeMap::new();

    for _ in 0..count {
        let field_id = crate::schema::FieldId::new(take_u16(buf)?);

        match schema.field_kind(field_id) {
            None => {
                // Forward compatibility: written by a newer schema.
                skip_value(buf)?;
            }
            Some(kind) => {
                let tag = peek_u8(buf)?;
                let value = read_value(registry, buf)?;
                if !kind.admits(&value) {
                    return Err(CodecError::FieldKindMismatch {
                        type_id,
                        field_id,
                        expected: kind,
                        found: tag,
                    });
                }
                fields.insert(field_id, value);
            }
        }
    }

    // Backward compatibility: declared fields absent from the data.
    for (&field_id, &kind) in &schema.fields {
        fields
            .entry(field_id)
            .or_insert_with(|| kind.default_value());
    }

    Ok(TypedValue { type_id, fields })
}

fn read_value(registry: &Registry, buf: &mut &[u8]) -> CodecResult<Value> {
    let tag = take_u8(buf)?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => Ok(Value::Bool(take_u8(buf)? != 0)),
        TAG_INT => {
            let raw = take_exact(buf, 8)?;
            Ok(Value::Int(i64::from_le_bytes(raw.try_into().unwrap())))
        }
        TAG_FLOAT => {
            let raw = take_exact(buf, 8)?;
            Ok(Value::Float(f64::from_le_bytes(raw.try_into().unwrap())))
        }
        TAG_BYTES => {
            let len = take_u32(buf)? as usize;
            Ok(Value::Bytes(take_exact(buf, len)?.to_vec()))
        }
        TAG_TEXT => {
            let len = take_u32(buf)? as usize;
            let raw = take_exact(buf, len)?;
            let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
            Ok(Value::Text(text.to_string()))
        }
        TAG_LIST => {
            let count = take_u32(buf)?;
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                items.push(read_value(registry, buf)?);
            }
            Ok(Value::List(items))
        }
        TAG_MAP => {
            let count = take_u32(buf)?;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let key_len = take_u32(buf)? as usize;
                let raw = take_exact(buf, key_len)?;
                let key = std::str::from_utf8(raw)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_string();
                let item = read_value(registry, buf)?;
                entries.insert(key, item);
            }
            Ok(Value::Map(entries))
        }
        TAG_TYPED => {
            let nested_id = TypeId::new(take_u16(buf)?);
            let body_len = take_u32(buf)? as usize;
            let mut body = take_exact(buf, body_len)?;
            let nested = read_field_set(registry, nested_id, &mut body)?;
            if body.has_remaining() {
                return Err(CodecError::TrailingBytes(body.remaining()));
            }
            Ok(Value::Typed(nested))
        }
        other => Err(CodecError::InvalidValueTag(other)),
    }
}

/// Skips one tagged value without decoding it.
fn skip_value(buf: &mut &[u8]) -> CodecResult<()> {
    let tag = take_u8(buf)?;
    match tag {
        TAG_NULL => Ok(()),
        TAG_BOOL => take_u8(buf).map(|_| ()),
        TAG_INT | TAG_FLOAT => take_exact(buf, 8).map(|_| ()),
        TAG_BYTES | TAG_TEXT => {
            let len = take_u32(buf)? as usize;
            take_exact(buf, len).map(|_| ())
        }
        TAG_LIST => {
            let count = take_u32(buf)?;
            for _ in 0..count {
                skip_value(buf)?;
            }
            Ok(())
        }
        TAG_MAP => {
            let count = take_u32(buf)?;
            for _ in 0..count {
                let key_len = take_u32(buf)? as usize;
                take_exact(buf, key_len)?;
                skip_value(buf)?;
            }
            Ok(())
        }
        TAG_TYPED => {
            take_u16(buf)?;
            let body_len = take_u32(buf)? as usize;
            take_exact(buf, body_len).map(|_| ())
        }
        other => Err(CodecError::InvalidValueTag(other)),
    }
}

fn peek_u8(buf: &&[u8]) -> CodecResult<u8> {
    buf.first().copied().ok_or(CodecError::UnexpectedEof)
}

fn take_u8(buf: &mut &[u8]) -> CodecResult<u8> {
    if buf.remaining() < 1 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8]) -> CodecResult<u16> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u16_le())
}

fn take_u32(buf: &mut &[u8]) -> CodecResult<u32> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(buf.get_u32_le())
}

fn take_exact<'a>(buf: &mut &'a [u8], len: usize) -> CodecResult<&'a [u8]> {
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEof);
    }
    let whole: &'a [u8] = *buf;
    let (head, tail) = whole.split_at(len);
    *buf = tail;
    Ok(head)
}
