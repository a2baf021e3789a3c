//! Type schemas and the codec registry.

use crate::error::{CodecError, CodecResult};
use crate::reader::decode_field_set;
use crate::value::{TypedValue, Value};
use crate::writer::encode_field_set;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier for a registered type.
///
/// A type id is permanent for the lifetime of the type: once data has been
/// written under it, it must never identify anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u16);

impl TypeId {
    /// Creates a new type id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

/// Stable identifier for a field within a type.
///
/// Once shipped bound to a field's semantics, a field id must never be
/// reassigned to a different meaning. Retired fields may be dropped from
/// the schema, but their id is never reused. The codec cannot police this
/// convention; rebinding an id to an incompatible kind corrupts old data
/// silently except where the wire tag happens to disagree (which surfaces
/// as [`CodecError::FieldKindMismatch`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u16);

impl FieldId {
    /// Creates a new field id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field:{}", self.0)
    }
}

/// The declared kind of a schema field.
///
/// Kinds are explicit, handwritten descriptors; there is no reflection.
/// Each kind supplies the default used when a declared field is absent
/// from older data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean field, defaults to `false`.
    Bool,
    /// Integer field, defaults to `0`.
    Int,
    /// Float field, defaults to `0.0`.
    Float,
    /// Byte-string field, defaults to empty.
    Bytes,
    /// Text field, defaults to empty.
    Text,
    /// List field, defaults to empty.
    List,
    /// Map field, defaults to empty.
    Map,
    /// Nested typed field, defaults to null.
    Typed(TypeId),
}

impl FieldKind {
    /// Returns the default value for a declared-but-absent field.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Int => Value::Int(0),
            FieldKind::Float => Value::Float(0.0),
            FieldKind::Bytes => Value::Bytes(Vec::new()),
            FieldKind::Text => Value::Text(String::new()),
            FieldKind::List => Value::List(Vec::new()),
            FieldKind::Map => Value::Map(BTreeMap::new()),
            FieldKind::Typed(_) => Value::Null,
        }
    }

    /// Checks whether a value is admissible for this kind.
    ///
    /// `Null` is admissible for every kind.
    #[must_use]
    pub fn admits(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Int, Value::Int(_)) => true,
            (FieldKind::Float, Value::Float(_)) => true,
            (FieldKind::Bytes, Value::Bytes(_)) => true,
            (FieldKind::Text, Value::Text(_)) => true,
            (FieldKind::List, Value::List(_)) => true,
            (FieldKind::Map, Value::Map(_)) => true,
            (FieldKind::Typed(id), Value::Typed(t)) => t.type_id == id,
            _ => false,
        }
    }
}

/// Schema for one registered type: a map of field ids to field kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSchema {
    /// The type this schema describes.
    pub type_id: TypeId,
    /// Declared fields.
    pub fields: BTreeMap<FieldId, FieldKind>,
}

impl TypeSchema {
    /// Creates an empty schema for a type.
    #[must_use]
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            fields: BTreeMap::new(),
        }
    }

    /// Declares a field, builder style.
    #[must_use]
    pub fn with_field(mut self, field_id: FieldId, kind: FieldKind) -> Self {
        self.fields.insert(field_id, kind);
        self
    }

    /// Returns the declared kind of a field, if any.
    #[must_use]
    pub fn field_kind(&self, field_id: FieldId) -> Option<FieldKind> {
        self.fields.get(&field_id).copied()
    }
}

/// An explicit, application-owned codec registry.
///
/// The registry maps type ids to schemas and drives all encoding and
/// decoding. It is constructed and owned by the embedding application and
/// passed into `open()` - there is no process-wide registry and no global
/// mutable state.
///
/// # Example
///
/// ```rust
/// use caskdb_codec::{FieldId, FieldKind, Registry, TypeId, TypeSchema, TypedValue};
///
/// let mut registry = Registry::new();
/// registry.register(
///     TypeSchema::new(TypeId::new(1))
///         .with_field(FieldId::new(0), FieldKind::Text)
///         .with_field(FieldId::new(1), FieldKind::Int),
/// ).unwrap();
///
/// let value = TypedValue::new(TypeId::new(1))
///     .with_field(FieldId::new(0), "alice")
///     .with_field(FieldId::new(1), 30i64);
///
/// let bytes = registry.encode(&value).unwrap();
/// let decoded = registry.decode(TypeId::new(1), &bytes).unwrap();
/// assert_eq!(decoded.field(FieldId::new(0)), value.field(FieldId::new(0)));
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    schemas: BTreeMap<TypeId, TypeSchema>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type schema.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DuplicateTypeId`] if another schema already
    /// claims the same type id.
    pub fn register(&mut self, schema: TypeSchema) -> CodecResult<()> {
        if self.schemas.contains_key(&schema.type_id) {
            return Err(CodecError::DuplicateTypeId(schema.type_id));
        }
        self.schemas.insert(schema.type_id, schema);
        Ok(())
    }

    /// Returns the schema for a type id, if registered.
    #[must_use]
    pub fn schema(&self, type_id: TypeId) -> Option<&TypeSchema> {
        self.schemas.get(&type_id)
    }

    /// Checks whether a type id is registered.
    #[must_use]
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.schemas.contains_key(&type_id)
    }

    /// Encodes a typed value against its registered schema.
    ///
    /// Only schema-declared fields are written; fields present on the
    /// value but absent from the schema are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownType`] if the value's type id (or a
    /// nested one) is unregistered, or [`CodecError::FieldKindMismatch`]
    /// if a field value disagrees with its declared kind.
    pub fn encode(&self, value: &TypedValue) -> CodecResult<Vec<u8>> {
        encode_field_set(self, value)
    }

    /// Decodes a typed value using the *current* schema for `type_id`.
    ///
    /// Schema evolution happens here: a field id present in the data but
    /// absent from the current schema is skipped, and a declared field
    /// absent from the data is filled with its kind's default.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownType`] if `type_id` is unregistered,
    /// or a decoding error for malformed input.
    pub fn decode(&self, type_id: TypeId, bytes: &[u8]) -> CodecResult<TypedValue> {
        decode_field_set(self, type_id, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_type_id_rejected() {
        let mut registry = Registry::new();
        registry.register(TypeSchema::new(TypeId::new(7))).unwrap();

        let result = registry.register(
            TypeSchema::new(TypeId::new(7)).with_field(FieldId::new(0), FieldKind::Int),
        );
        assert_eq!(result, Err(CodecError::DuplicateTypeId(TypeId::new(7))));
    }

    #[test]
    fn schema_lookup() {
        let mut registry = Registry::new();
        registry
            .register(TypeSchema::new(TypeId::new(3)).with_field(FieldId::new(1), FieldKind::Text))
            .unwrap();

        assert!(registry.contains(TypeId::new(3)));
        assert!(!registry.contains(TypeId::new(4)));

        let schema = registry.schema(TypeId::new(3)).unwrap();
        assert_eq!(schema.field_kind(FieldId::new(1)), Some(FieldKind::Text));
        assert_eq!(schema.field_kind(FieldId::new(2)), None);
    }

    #[test]
    fn field_kind_defaults() {
        assert_eq!(FieldKind::Bool.default_value(), Value::Bool(false));
        assert_eq!(FieldKind::Int.default_value(), Value::Int(0));
        assert_eq!(FieldKind::Text.default_value(), Value::Text(String::new()));
        assert_eq!(FieldKind::Typed(TypeId::new(1)).default_value(), Value::Null);
    }

    #[test]
    fn field_kind_admits() {
        assert!(FieldKind::Int.admits(&Value::Int(1)));
        assert!(FieldKind::Int.admits(&Value::Null));
        assert!(!FieldKind::Int.admits(&Value::Text("1".into())));

        let typed = TypedValue::new(TypeId::new(2));
        assert!(FieldKind::Typed(TypeId::new(2)).admits(&Value::Typed(typed.clone())));
        assert!(!FieldKind::Typed(TypeId::new(3)).admits(&Value::Typed(typed)));
    }
}
