//! # caskdb Codec
//!
//! Tagged field-set encoding for caskdb.
//!
//! Typed values are encoded as a field count followed by
//! `(field id, tagged value)` pairs, driven by explicit [`TypeSchema`]
//! descriptors held in an application-owned [`Registry`]. Field ids are
//! permanent, which is what makes schema evolution work:
//!
//! - a field id present in data but absent from the current schema is
//!   skipped (forward compatibility)
//! - a declared field absent from the data decodes to its kind's default
//!   (backward compatibility)
//!
//! ## Usage
//!
//! ```
//! use caskdb_codec::{FieldId, FieldKind, Registry, TypeId, TypeSchema, TypedValue};
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     TypeSchema::new(TypeId::new(1))
//!         .with_field(FieldId::new(0), FieldKind::Text)
//!         .with_field(FieldId::new(1), FieldKind::Int),
//! ).unwrap();
//!
//! let book = TypedValue::new(TypeId::new(1))
//!     .with_field(FieldId::new(0), "The Left Hand of Darkness")
//!     .with_field(FieldId::new(1), 1969i64);
//!
//! let bytes = registry.encode(&book).unwrap();
//! let decoded = registry.decode(TypeId::new(1), &bytes).unwrap();
//! assert_eq!(decoded, book);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod reader;
mod schema;
mod value;
mod writer;

pub use error::{CodecError, CodecResult};
pub use reader::decode_field_set;
pub use schema::{FieldId, FieldKind, Registry, TypeId, TypeSchema};
pub use value::{TypedValue, Value};
pub use writer::{encode_field_set, value_tag};
