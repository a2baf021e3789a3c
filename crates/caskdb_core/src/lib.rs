//! # caskdb Core
//!
//! An embedded, single-process, log-structured key-value storage engine.
//!
//! A [`Cask`] is a named key-value collection backed by one append-only
//! log of checksummed frames. The engine provides:
//!
//! - crash recovery by scanning to the last checksum-valid frame
//! - schema evolution through the field-tagged codec in `caskdb_codec`
//! - copy-forward compaction with an atomic file swap
//! - optional AES-256-GCM payload encryption
//! - synchronous change notifications
//!
//! ## Opening a cask
//!
//! ```rust,ignore
//! use caskdb_core::{Cask, CaskConfig, Key};
//! use caskdb_codec::{FieldId, FieldKind, Registry, TypeId, TypeSchema, TypedValue};
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     TypeSchema::new(TypeId::new(1))
//!         .with_field(FieldId::new(0), FieldKind::Text),
//! )?;
//!
//! let cask = Cask::open(Path::new("data"), "books", Arc::new(registry), CaskConfig::default())?;
//! cask.put(Key::from("dune"), TypedValue::new(TypeId::new(1))
//!     .with_field(FieldId::new(0), "Frank Herbert"))?;
//! cask.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cask;
pub mod change_feed;
pub mod cipher;
pub mod compaction;
mod config;
pub mod dir;
mod error;
pub mod frame;
pub mod index;
mod key;
pub mod log;

pub use cask::Cask;
pub use change_feed::{ChangeEvent, ChangeFeed, ChangeKind, WatchToken};
pub use cipher::CipherKey;
pub use compaction::CompactionStats;
pub use config::{AccessMode, CaskConfig};
pub use error::{CaskError, CaskResult};
pub use key::Key;

// The codec is half of the public API surface; re-export it.
pub use caskdb_codec::{
    CodecError, FieldId, FieldKind, Registry, TypeId, TypeSchema, TypedValue, Value,
};
