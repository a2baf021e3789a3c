//! Change feed for observing cask mutations.
//!
//! Watchers are plain callbacks with optional key filters. Delivery is
//! synchronous and in-process: the cask fires matching watchers after a
//! mutation's index update and before the mutating call returns to its
//! caller.
//!
//! # Usage
//!
//! ```rust,ignore
//! let token = cask.listen(
//!     |event| println!("{:?} {}", event.kind, event.key),
//!     Some(vec![Key::from("watched")]),
//! )?;
//!
//! cask.put(Key::from("watched"), value)?;   // fires
//! cask.put(Key::from("other"), value)?;     // does not
//!
//! cask.unlisten(token);                     // idempotent
//! ```

use crate::key::Key;
use caskdb_codec::TypedValue;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of change observed on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Key was written and no previous version existed.
    Insert,
    /// Key was written over a previous version.
    Update,
    /// Key was deleted.
    Delete,
}

/// A single change event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The key that changed.
    pub key: Key,
    /// What happened to it.
    pub kind: ChangeKind,
    /// The new value for inserts and updates; `None` for deletes.
    pub value: Option<TypedValue>,
}

/// Token identifying a watcher; pass back to `unlisten`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

type WatchCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

struct Watcher {
    token: u64,
    filter: Option<HashSet<Key>>,
    callback: WatchCallback,
}

impl Watcher {
    fn matches(&self, key: &Key) -> bool {
        match &self.filter {
            Some(keys) => keys.contains(key),
            None => true,
        }
    }
}

/// Distributes cask mutations to registered watchers.
///
/// Watcher lifetimes are explicit: registration returns a [`WatchToken`],
/// deregistration takes it back, and closing the cask drops every watcher.
/// Nothing is tied to value lifetimes or drop order.
pub struct ChangeFeed {
    watchers: RwLock<Vec<Arc<Watcher>>>,
    next_token: AtomicU64,
}

impl ChangeFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            watchers: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Registers a watcher.
    ///
    /// With `keys` set, only events touching one of those keys fire the
    /// callback; with `None`, every event does.
    pub fn watch<F>(&self, callback: F, keys: Option<Vec<Key>>) -> WatchToken
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.watchers.write().push(Arc::new(Watcher {
            token,
            filter: keys.map(|k| k.into_iter().collect()),
            callback: Box::new(callback),
        }));
        WatchToken(token)
    }

    /// Deregisters a watcher. Unknown or already-removed tokens are a no-op.
    pub fn unwatch(&self, token: WatchToken) {
        self.watchers.write().retain(|w| w.token != token.0);
    }

    /// Fires matching watchers synchronously.
    ///
    /// Callbacks run outside the watcher-list lock, so a callback may
    /// register or deregister watchers without deadlocking.
    pub fn emit(&self, event: &ChangeEvent) {
        let matching: Vec<Arc<Watcher>> = self
            .watchers
            .read()
            .iter()
            .filter(|w| w.matches(&event.key))
            .cloned()
            .collect();

        for watcher in matching {
            (watcher.callback)(event);
        }
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Drops every watcher. Called when the cask closes.
    pub fn clear(&self) {
        self.watchers.write().clear();
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("watcher_count", &self.watcher_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn insert_event(key: &str) -> ChangeEvent {
        ChangeEvent {
            key: Key::from(key),
            kind: ChangeKind::Insert,
            value: None,
        }
    }

    #[test]
    fn unfiltered_watcher_sees_everything() {
        let feed = ChangeFeed::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        feed.watch(move |_| { c.fetch_add(1, Ordering::SeqCst); }, None);

        feed.emit(&insert_event("a"));
        feed.emit(&insert_event("b"));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn key_filter_selects_events() {
        let feed = ChangeFeed::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        feed.watch(
            move |_| { c.fetch_add(1, Ordering::SeqCst); },
            Some(vec![Key::from("x")]),
        );

        feed.emit(&insert_event("y"));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        feed.emit(&insert_event("x"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_carry_the_new_value() {
        use caskdb_codec::{FieldId, TypeId, TypedValue};

        let feed = ChangeFeed::new();
        let seen = Arc::new(RwLock::new(Vec::new()));

        let s = Arc::clone(&seen);
        feed.watch(move |e| s.write().push(e.clone()), None);

        let value = TypedValue::new(TypeId::new(1)).with_field(FieldId::new(0), 9i64);
        feed.emit(&ChangeEvent {
            key: Key::Int(0),
            kind: ChangeKind::Update,
            value: Some(value.clone()),
        });

        let events = seen.read();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value, Some(value));
    }

    #[test]
    fn unwatch_is_idempotent() {
        let feed = ChangeFeed::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let token = feed.watch(move |_| { c.fetch_add(1, Ordering::SeqCst); }, None);

        feed.unwatch(token);
        feed.unwatch(token);
        assert_eq!(feed.watcher_count(), 0);

        feed.emit(&insert_event("a"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_drops_all_watchers() {
        let feed = ChangeFeed::new();
        feed.watch(|_| {}, None);
        feed.watch(|_| {}, Some(vec![Key::Int(1)]));
        assert_eq!(feed.watcher_count(), 2);

        feed.clear();
        assert_eq!(feed.watcher_count(), 0);
    }

    #[test]
    fn callback_may_unwatch_itself() {
        let feed = Arc::new(ChangeFeed::new());
        let slot: Arc<RwLock<Option<WatchToken>>> = Arc::new(RwLock::new(None));

        let feed2 = Arc::clone(&feed);
        let slot2 = Arc::clone(&slot);
        let token = feed.watch(
            move |_| {
                if let Some(t) = *slot2.read() {
                    feed2.unwatch(t);
                }
            },
            None,
        );
        *slot.write() = Some(token);

        feed.emit(&insert_event("a"));
        assert_eq!(feed.watcher_count(), 0);
    }
}
