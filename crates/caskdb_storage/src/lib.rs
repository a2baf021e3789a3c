//! # caskdb Storage
//!
//! Storage backend trait and implementations for caskdb.
//!
//! Backends are **opaque byte stores**: they read, append, truncate, and
//! flush bytes, and never interpret frame contents. The engine above owns
//! the file format.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - persistent storage over OS file APIs
//! - [`InMemoryBackend`] - tests and ephemeral casks
//!
//! ## Example
//!
//! ```rust
//! use caskdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
