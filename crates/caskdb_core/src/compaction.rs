//! Log compaction.
//!
//! Compaction copies the newest frame of every live key into a scratch
//! file, in stable key order, then atomically swaps the scratch file over
//! the live log. The index - not the file - is the authoritative live set,
//! so superseded versions and tombstones simply never make it across.
//!
//! ## Invariants
//!
//! - Never loses a live key, never resurrects a deleted one
//! - Output size is O(live keys), independent of historical write volume
//! - The original file is untouched until the swap is finalized
//! - Runs under the cask's writer lock; readers observe pre- or
//!   post-compaction state, never a mix

use crate::dir::CaskDir;
use crate::error::CaskResult;
use crate::frame::Frame;
use crate::index::CaskIndex;
use crate::log::LogStore;
use caskdb_storage::{FileBackend, InMemoryBackend};
use tracing::debug;

/// Result of a compaction run.
#[derive(Debug, Clone, Copy)]
pub struct CompactionStats {
    /// Live frames copied into the new log.
    pub live_frames: usize,
    /// Log size before compaction.
    pub before_size: u64,
    /// Log size after compaction.
    pub after_size: u64,
}

impl CompactionStats {
    /// Bytes reclaimed by the run.
    #[must_use]
    pub fn reclaimed_bytes(&self) -> u64 {
        self.before_size.saturating_sub(self.after_size)
    }
}

/// Rewrites the log keeping only live keys and updates the index to the
/// new offsets.
///
/// With a [`CaskDir`], the rewrite goes through the scratch file and an
/// atomic rename; without one (in-memory casks) the backend is swapped
/// directly. Either way the old log remains intact until the swap.
pub(crate) fn compact_log(
    log: &mut LogStore,
    index: &mut CaskIndex,
    dir: Option<&CaskDir>,
) -> CaskResult<CompactionStats> {
    let before_size = log.size()?;

    // Plan from the index: newest frame per live key, stable order.
    let mut frames = Vec::with_capacity(index.len());
    for (key, entry) in index.iter() {
        let payload = log.read_payload(entry.handle.payload_offset, entry.handle.payload_len)?;
        frames.push(Frame::put(key.clone(), entry.type_id, payload));
    }

    let handles = match dir {
        Some(dir) => {
            dir.remove_stale_compact_file()?;

            let mut scratch = LogStore::new(Box::new(FileBackend::open_with_create_dirs(
                &dir.compact_path(),
            )?));
            let handles = scratch.append_batch(&frames)?;
            scratch.sync()?;
            drop(scratch);

            dir.swap_compact_file()?;
            log.replace_backend(Box::new(FileBackend::open(&dir.log_path())?));
            handles
        }
        None => {
            let mut scratch = LogStore::new(Box::new(InMemoryBackend::new()));
            let handles = scratch.append_batch(&frames)?;
            log.replace_backend(scratch.into_backend());
            handles
        }
    };

    for (frame, handle) in frames.iter().zip(handles) {
        index.relocate(&frame.key, handle);
    }

    let stats = CompactionStats {
        live_frames: frames.len(),
        before_size,
        after_size: log.size()?,
    };
    debug!(
        live_frames = stats.live_frames,
        reclaimed = stats.reclaimed_bytes(),
        "compaction finished"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use crate::key::Key;
    use caskdb_codec::TypeId;

    fn append_indexed(log: &mut LogStore, index: &mut CaskIndex, key: Key, payload: &[u8]) {
        let frame = Frame::put(key.clone(), TypeId::new(1), payload.to_vec());
        let handle = log.append(&frame).unwrap();
        index.insert(
            key,
            IndexEntry {
                type_id: TypeId::new(1),
                handle,
                value: None,
            },
        );
    }

    fn append_tombstone(log: &mut LogStore, index: &mut CaskIndex, key: Key) {
        log.append(&Frame::tombstone(key.clone())).unwrap();
        index.remove(&key);
    }

    #[test]
    fn drops_superseded_versions_and_tombstones() {
        let mut log = LogStore::new(Box::new(InMemoryBackend::new()));
        let mut index = CaskIndex::new();

        append_indexed(&mut log, &mut index, Key::from("a"), b"v1");
        append_indexed(&mut log, &mut index, Key::from("b"), b"b1");
        append_indexed(&mut log, &mut index, Key::from("a"), b"v2");
        append_indexed(&mut log, &mut index, Key::from("c"), b"c1");
        append_tombstone(&mut log, &mut index, Key::from("c"));

        let stats = compact_log(&mut log, &mut index, None).unwrap();

        assert_eq!(stats.live_frames, 2);
        assert!(stats.after_size < stats.before_size);

        // The rewritten file holds exactly the live set.
        let outcome = log.scan().unwrap();
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].frame.key, Key::from("a"));
        assert_eq!(outcome.entries[0].frame.payload, b"v2");
        assert_eq!(outcome.entries[1].frame.key, Key::from("b"));
    }

    #[test]
    fn index_points_into_new_file() {
        let mut log = LogStore::new(Box::new(InMemoryBackend::new()));
        let mut index = CaskIndex::new();

        for i in 0..10u32 {
            append_indexed(&mut log, &mut index, Key::Int(i), &[i as u8; 16]);
        }
        // Overwrite half of them.
        for i in 0..5u32 {
            append_indexed(&mut log, &mut index, Key::Int(i), &[0xEE; 16]);
        }

        compact_log(&mut log, &mut index, None).unwrap();

        for i in 0..10u32 {
            let entry = index.get(&Key::Int(i)).unwrap();
            let payload = log
                .read_payload(entry.handle.payload_offset, entry.handle.payload_len)
                .unwrap();
            let expected = if i < 5 { vec![0xEE; 16] } else { vec![i as u8; 16] };
            assert_eq!(payload, expected, "key {i}");
        }
    }

    #[test]
    fn empty_index_compacts_to_empty_log() {
        let mut log = LogStore::new(Box::new(InMemoryBackend::new()));
        let mut index = CaskIndex::new();

        append_indexed(&mut log, &mut index, Key::from("a"), b"x");
        append_tombstone(&mut log, &mut index, Key::from("a"));

        let stats = compact_log(&mut log, &mut index, None).unwrap();
        assert_eq!(stats.live_frames, 0);
        assert_eq!(log.size().unwrap(), 0);
    }

    #[test]
    fn output_is_in_stable_key_order() {
        let mut log = LogStore::new(Box::new(InMemoryBackend::new()));
        let mut index = CaskIndex::new();

        append_indexed(&mut log, &mut index, Key::from("zeta"), b"z");
        append_indexed(&mut log, &mut index, Key::Int(9), b"9");
        append_indexed(&mut log, &mut index, Key::from("alpha"), b"a");
        append_indexed(&mut log, &mut index, Key::Int(2), b"2");

        compact_log(&mut log, &mut index, None).unwrap();

        let keys: Vec<Key> = log
            .scan()
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.frame.key)
            .collect();
        assert_eq!(
            keys,
            vec![Key::Int(2), Key::Int(9), Key::from("alpha"), Key::from("zeta")]
        );
    }
}
