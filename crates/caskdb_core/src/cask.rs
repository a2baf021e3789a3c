//! The cask: a named key-value collection backed by one frame log.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeKind, WatchToken};
use crate::cipher::FrameCipher;
use crate::compaction::{self, CompactionStats};
use crate::config::{AccessMode, CaskConfig};
use crate::dir::CaskDir;
use crate::error::{CaskError, CaskResult};
use crate::frame::Frame;
use crate::index::{CaskIndex, IndexEntry};
use crate::key::Key;
use crate::log::LogStore;
use caskdb_codec::{Registry, TypeId, TypedValue};
use caskdb_storage::{FileBackend, InMemoryBackend};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A named key-value collection backed by one append-only frame log.
///
/// The cask is the single entry point: it delegates encoding to the
/// [`Registry`], encryption to the configured cipher, durability to its
/// [`LogStore`], and lookups to its in-memory index, and it exclusively
/// owns all of them.
///
/// # Concurrency
///
/// Single writer per cask: `put`, `put_all`, `add`, `delete`, and
/// `compact` serialize through an internal write lock. Eager `get` takes
/// only a read lock over the index; lazy `get` additionally reads from
/// disk under that read lock. Index updates are visible to an
/// immediately-following `get`; physical durability is deferred until
/// [`flush`](Self::flush), [`close`](Self::close), or every write when
/// [`CaskConfig::sync_on_write`] is set.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = Registry::new();
/// registry.register(
///     TypeSchema::new(TypeId::new(1)).with_field(FieldId::new(0), FieldKind::Text),
/// )?;
///
/// let cask = Cask::open(Path::new("data"), "books", Arc::new(registry), CaskConfig::default())?;
/// cask.put(Key::from("dune"), TypedValue::new(TypeId::new(1))
///     .with_field(FieldId::new(0), "Frank Herbert"))?;
/// let book = cask.get(&Key::from("dune"))?;
/// cask.close()?;
/// ```
pub struct Cask {
    name: String,
    config: CaskConfig,
    registry: Arc<Registry>,
    cipher: Option<FrameCipher>,
    dir: Mutex<Option<CaskDir>>,
    state: RwLock<CaskState>,
    feed: ChangeFeed,
    open: AtomicBool,
}

struct CaskState {
    log: LogStore,
    index: CaskIndex,
}

impl Cask {
    /// Opens a cask inside `dir`, scanning its log and rebuilding the
    /// index.
    ///
    /// The scan applies puts and tombstones in file order (last write
    /// wins) and silently truncates any torn tail left by a crash. Cost is
    /// O(file size), dominated by decoding in eager mode and by the scan
    /// alone in lazy mode.
    ///
    /// # Errors
    ///
    /// - [`CaskError::LockHeld`] if another handle has the cask open
    /// - [`CaskError::Codec`] if eager decoding meets an unregistered type
    /// - I/O errors
    pub fn open(
        dir: &Path,
        name: &str,
        registry: Arc<Registry>,
        config: CaskConfig,
    ) -> CaskResult<Self> {
        let cask_dir = CaskDir::open(dir, name, config.create_if_missing)?;
        cask_dir.remove_stale_compact_file()?;

        let backend = FileBackend::open(&cask_dir.log_path())?;
        Self::build(name, registry, config, Some(cask_dir), Box::new(backend))
    }

    /// Opens a non-persistent cask that lives only in memory.
    ///
    /// Useful for tests and caches; data is lost when the cask is dropped.
    pub fn open_in_memory(
        name: &str,
        registry: Arc<Registry>,
        config: CaskConfig,
    ) -> CaskResult<Self> {
        Self::build(
            name,
            registry,
            config,
            None,
            Box::new(InMemoryBackend::new()),
        )
    }

    fn build(
        name: &str,
        registry: Arc<Registry>,
        config: CaskConfig,
        dir: Option<CaskDir>,
        backend: Box<dyn caskdb_storage::StorageBackend>,
    ) -> CaskResult<Self> {
        let cipher = config.cipher_key.as_ref().map(FrameCipher::new);

        let cask = Self {
            name: name.to_string(),
            config,
            registry,
            cipher,
            dir: Mutex::new(dir),
            state: RwLock::new(CaskState {
                log: LogStore::new(backend),
                index: CaskIndex::new(),
            }),
            feed: ChangeFeed::new(),
            open: AtomicBool::new(true),
        };
        cask.load()?;
        Ok(cask)
    }

    /// Scans the log and rebuilds the index.
    fn load(&self) -> CaskResult<()> {
        let mut state = self.state.write();

        let outcome = state.log.scan()?;
        let file_size = state.log.size()?;
        if outcome.logical_end < file_size {
            warn!(
                cask = %self.name,
                logical_end = outcome.logical_end,
                file_size,
                "truncating torn log tail"
            );
            state.log.truncate(outcome.logical_end)?;
        }

        let frames = outcome.entries.len();
        for entry in outcome.entries {
            let key = entry.frame.key.clone();
            if entry.frame.tombstone {
                state.index.remove(&key);
            } else {
                let value = match self.config.mode {
                    AccessMode::Eager => {
                        Some(self.decode_payload(entry.frame.type_id, &entry.frame.payload)?)
                    }
                    AccessMode::Lazy => None,
                };
                state.index.insert(
                    key,
                    IndexEntry {
                        type_id: entry.frame.type_id,
                        handle: entry.handle,
                        value,
                    },
                );
            }
        }

        debug!(cask = %self.name, frames, live = state.index.len(), "cask opened");
        Ok(())
    }

    /// Returns the value stored under `key`, or `None` if the key is
    /// absent. Absence is not an error.
    ///
    /// Eager mode clones the cached value; lazy mode reads the payload at
    /// the indexed offset, decrypts, decodes, and returns it without
    /// caching.
    pub fn get(&self, key: &Key) -> CaskResult<Option<TypedValue>> {
        self.ensure_open()?;
        let state = self.state.read();

        let Some(entry) = state.index.get(key) else {
            return Ok(None);
        };

        match &entry.value {
            Some(value) => Ok(Some(value.clone())),
            None => {
                let payload = state
                    .log
                    .read_payload(entry.handle.payload_offset, entry.handle.payload_len)?;
                Ok(Some(self.decode_payload(entry.type_id, &payload)?))
            }
        }
    }

    /// Writes `value` under `key`.
    ///
    /// The index update is visible to an immediately-following `get`;
    /// watchers fire before this call returns.
    ///
    /// # Errors
    ///
    /// [`CaskError::Codec`] if the value's type id is unregistered or a
    /// field disagrees with its declared kind.
    pub fn put(&self, key: Key, value: TypedValue) -> CaskResult<()> {
        self.ensure_open()?;
        let payload = self.encode_value(&value)?;
        let frame = Frame::put(key.clone(), value.type_id, payload);

        let kind = {
            let mut state = self.state.write();
            let handle = state.log.append(&frame)?;
            if self.config.sync_on_write {
                state.log.sync()?;
            }

            let cached = matches!(self.config.mode, AccessMode::Eager).then(|| value.clone());
            let previous = state.index.insert(
                key.clone(),
                IndexEntry {
                    type_id: value.type_id,
                    handle,
                    value: cached,
                },
            );
            if previous.is_some() {
                ChangeKind::Update
            } else {
                ChangeKind::Insert
            }
        };

        self.feed.emit(&ChangeEvent {
            key,
            kind,
            value: Some(value),
        });
        self.maybe_auto_compact()
    }

    /// Writes `value` under a freshly allocated auto-increment key and
    /// returns that key.
    ///
    /// Keys are cask-local, monotonically increasing integers starting at
    /// 0 for an empty cask; a deleted key is never reassigned.
    pub fn add(&self, value: TypedValue) -> CaskResult<u32> {
        self.ensure_open()?;
        let payload = self.encode_value(&value)?;

        let key = {
            let mut state = self.state.write();
            let key = Key::Int(state.index.allocate_int_key());

            let frame = Frame::put(key.clone(), value.type_id, payload);
            let handle = state.log.append(&frame)?;
            if self.config.sync_on_write {
                state.log.sync()?;
            }

            let cached = matches!(self.config.mode, AccessMode::Eager).then(|| value.clone());
            state.index.insert(
                key.clone(),
                IndexEntry {
                    type_id: value.type_id,
                    handle,
                    value: cached,
                },
            );
            key
        };

        let allocated = key.as_int().unwrap_or_default();
        self.feed.emit(&ChangeEvent {
            key,
            kind: ChangeKind::Insert,
            value: Some(value),
        });
        self.maybe_auto_compact()?;
        Ok(allocated)
    }

    /// Deletes `key`, appending a tombstone and removing it from the
    /// index. Deleting an absent key is a no-op and fires no watcher.
    pub fn delete(&self, key: &Key) -> CaskResult<()> {
        self.ensure_open()?;

        let removed = {
            let mut state = self.state.write();
            if !state.index.contains(key) {
                return Ok(());
            }

            state.log.append(&Frame::tombstone(key.clone()))?;
            if self.config.sync_on_write {
                state.log.sync()?;
            }
            state.index.remove(key).is_some()
        };

        if removed {
            self.feed.emit(&ChangeEvent {
                key: key.clone(),
                kind: ChangeKind::Delete,
                value: None,
            });
        }
        self.maybe_auto_compact()
    }

    /// Writes a batch of entries in one append burst.
    ///
    /// The whole batch is encoded up front - an unregistered type fails
    /// the call before anything is written - then appended with a single
    /// I/O operation, preserving per-key semantics and watcher events.
    pub fn put_all(&self, entries: Vec<(Key, TypedValue)>) -> CaskResult<()> {
        self.ensure_open()?;

        let mut frames = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            let payload = self.encode_value(value)?;
            frames.push(Frame::put(key.clone(), value.type_id, payload));
        }

        let events = {
            let mut state = self.state.write();
            let handles = state.log.append_batch(&frames)?;
            if self.config.sync_on_write {
                state.log.sync()?;
            }

            let mut events = Vec::with_capacity(entries.len());
            for ((key, value), handle) in entries.into_iter().zip(handles) {
                let cached = matches!(self.config.mode, AccessMode::Eager).then(|| value.clone());
                let previous = state.index.insert(
                    key.clone(),
                    IndexEntry {
                        type_id: value.type_id,
                        handle,
                        value: cached,
                    },
                );
                events.push(ChangeEvent {
                    key,
                    kind: if previous.is_some() {
                        ChangeKind::Update
                    } else {
                        ChangeKind::Insert
                    },
                    value: Some(value),
                });
            }
            events
        };

        for event in &events {
            self.feed.emit(event);
        }
        self.maybe_auto_compact()
    }

    /// Live keys in stable order.
    pub fn keys(&self) -> CaskResult<Vec<Key>> {
        self.ensure_open()?;
        Ok(self.state.read().index.keys())
    }

    /// All live values, in key order.
    ///
    /// In lazy mode this is a full disk read-through.
    pub fn values(&self) -> CaskResult<Vec<TypedValue>> {
        self.ensure_open()?;
        let state = self.state.read();

        let mut values = Vec::with_capacity(state.index.len());
        for (_, entry) in state.index.iter() {
            match &entry.value {
                Some(value) => values.push(value.clone()),
                None => {
                    let payload = state
                        .log
                        .read_payload(entry.handle.payload_offset, entry.handle.payload_len)?;
                    values.push(self.decode_payload(entry.type_id, &payload)?);
                }
            }
        }
        Ok(values)
    }

    /// Number of live keys.
    pub fn len(&self) -> CaskResult<usize> {
        self.ensure_open()?;
        Ok(self.state.read().index.len())
    }

    /// Whether the cask holds no live keys.
    pub fn is_empty(&self) -> CaskResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether `key` is live.
    pub fn contains_key(&self, key: &Key) -> CaskResult<bool> {
        self.ensure_open()?;
        Ok(self.state.read().index.contains(key))
    }

    /// Current log file size in bytes.
    pub fn file_size(&self) -> CaskResult<u64> {
        self.ensure_open()?;
        self.state.read().log.size()
    }

    /// Forces all written data to durable storage.
    pub fn flush(&self) -> CaskResult<()> {
        self.ensure_open()?;
        let mut state = self.state.write();
        state.log.flush()?;
        state.log.sync()
    }

    /// Rewrites the log keeping only live keys.
    ///
    /// Blocks mutations for the duration; readers observe either the pre-
    /// or post-compaction state.
    pub fn compact(&self) -> CaskResult<CompactionStats> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let dir = self.dir.lock();
        let state = &mut *state;
        compaction::compact_log(&mut state.log, &mut state.index, dir.as_ref())
    }

    /// Registers a watcher fired on every mutation touching a key in
    /// `keys`, or any key when `keys` is `None`.
    ///
    /// Delivery is synchronous: the callback runs after the mutating
    /// operation's index update and before that operation returns.
    pub fn listen<F>(&self, callback: F, keys: Option<Vec<Key>>) -> CaskResult<WatchToken>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        Ok(self.feed.watch(callback, keys))
    }

    /// Deregisters a watcher. Idempotent.
    pub fn unlisten(&self, token: WatchToken) {
        self.feed.unwatch(token);
    }

    /// Closes the cask: optional compaction, flush, index teardown,
    /// watcher cancellation, lock release. Idempotent.
    ///
    /// Any operation after `close` fails with [`CaskError::CaskClosed`].
    pub fn close(&self) -> CaskResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut state = self.state.write();
        let mut dir = self.dir.lock();

        if self.config.compact_on_close {
            let state = &mut *state;
            compaction::compact_log(&mut state.log, &mut state.index, dir.as_ref())?;
        }

        state.log.flush()?;
        state.log.sync()?;
        state.index.clear();
        self.feed.clear();

        // Releases the advisory lock.
        *dir = None;

        debug!(cask = %self.name, "cask closed");
        Ok(())
    }

    /// Closes the cask and removes its files from disk.
    pub fn delete_from_disk(self) -> CaskResult<()> {
        self.open.store(false, Ordering::SeqCst);
        self.feed.clear();
        self.state.write().index.clear();

        if let Some(dir) = self.dir.lock().take() {
            dir.delete_files()?;
        }
        Ok(())
    }

    /// The cask's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the cask is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> CaskResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CaskError::CaskClosed)
        }
    }

    fn encode_value(&self, value: &TypedValue) -> CaskResult<Vec<u8>> {
        let plain = self.registry.encode(value)?;
        match &self.cipher {
            Some(cipher) => cipher.encrypt(&plain),
            None => Ok(plain),
        }
    }

    fn decode_payload(&self, type_id: TypeId, payload: &[u8]) -> CaskResult<TypedValue> {
        let plain = match &self.cipher {
            Some(cipher) => cipher.decrypt(payload)?,
            None => payload.to_vec(),
        };
        Ok(self.registry.decode(type_id, &plain)?)
    }

    /// Compacts when the bloat ratio exceeds the configured threshold.
    ///
    /// Skipped for files under 4 KiB and when the threshold is 1.0.
    fn maybe_auto_compact(&self) -> CaskResult<()> {
        const MIN_AUTO_COMPACT_SIZE: u64 = 4096;

        if self.config.compaction_threshold >= 1.0 {
            return Ok(());
        }

        let (size, live) = {
            let state = self.state.read();
            (state.log.size()?, state.index.live_bytes())
        };
        if size < MIN_AUTO_COMPACT_SIZE {
            return Ok(());
        }

        let bloat = size.saturating_sub(live) as f64 / size as f64;
        if bloat > self.config.compaction_threshold {
            debug!(cask = %self.name, bloat, "bloat threshold exceeded");
            self.compact()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cask")
            .field("name", &self.name)
            .field("mode", &self.config.mode)
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for Cask {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
