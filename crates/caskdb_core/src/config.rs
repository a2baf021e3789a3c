//! Cask configuration.

use crate::cipher::CipherKey;

/// Whether values are materialized at open time or read from disk on
/// demand.
///
/// The two modes share every invariant - locking, visibility, recovery -
/// and differ only in where `get` finds its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Decode every value into memory during the open scan; `get` clones
    /// from the index.
    #[default]
    Eager,
    /// Keep only offsets in memory; `get` reads, decrypts, and decodes per
    /// call, caching nothing.
    Lazy,
}

/// Configuration for opening a cask.
#[derive(Debug, Clone)]
pub struct CaskConfig {
    /// Eager or lazy value access.
    pub mode: AccessMode,

    /// Whether to create the cask's files if they don't exist.
    pub create_if_missing: bool,

    /// Whether to fsync after every mutation (safer but slower). When
    /// false, durability is deferred until `flush()` or `close()`.
    pub sync_on_write: bool,

    /// Bloat ratio `(file size - live bytes) / file size` above which a
    /// mutation triggers automatic compaction. `1.0` disables the
    /// automatic trigger. Files smaller than 4 KiB are never
    /// auto-compacted.
    pub compaction_threshold: f64,

    /// Whether `close()` compacts unconditionally before releasing the
    /// file.
    pub compact_on_close: bool,

    /// Payload encryption key. Never persisted by the engine.
    pub cipher_key: Option<CipherKey>,
}

impl Default for CaskConfig {
    fn default() -> Self {
        Self {
            mode: AccessMode::Eager,
            create_if_missing: true,
            sync_on_write: false,
            compaction_threshold: 0.5,
            compact_on_close: false,
            cipher_key: None,
        }
    }
}

impl CaskConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the access mode.
    #[must_use]
    pub fn mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether to create missing files.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync after every mutation.
    #[must_use]
    pub fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the automatic compaction bloat threshold.
    #[must_use]
    pub fn compaction_threshold(mut self, ratio: f64) -> Self {
        self.compaction_threshold = ratio;
        self
    }

    /// Sets whether `close()` compacts unconditionally.
    #[must_use]
    pub fn compact_on_close(mut self, value: bool) -> Self {
        self.compact_on_close = value;
        self
    }

    /// Sets the payload encryption key.
    #[must_use]
    pub fn cipher_key(mut self, key: CipherKey) -> Self {
        self.cipher_key = Some(key);
        self
    }
}
