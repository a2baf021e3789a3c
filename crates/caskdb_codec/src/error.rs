//! Error types for the codec crate.

use crate::schema::{FieldId, FieldKind, TypeId};
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// A schema was registered under a type id that is already claimed.
    #[error("type id {0} is already registered")]
    DuplicateTypeId(TypeId),

    /// No schema is registered for the given type id.
    #[error("no schema registered for type id {0}")]
    UnknownType(TypeId),

    /// A value's wire tag does not match the kind the schema declares.
    #[error("field {field_id} of type {type_id}: expected {expected:?}, found wire tag {found:#04x}")]
    FieldKindMismatch {
        /// The type whose schema was violated.
        type_id: TypeId,
        /// The offending field.
        field_id: FieldId,
        /// The kind declared by the current schema.
        expected: FieldKind,
        /// The wire tag actually present.
        found: u8,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// An unrecognized value tag was encountered.
    #[error("invalid value tag {0:#04x}")]
    InvalidValueTag(u8),

    /// A text value was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Input remained after the last declared field was read.
    #[error("trailing bytes after field set: {0} bytes")]
    TrailingBytes(usize),
}
