//! Append-only frame log.
//!
//! ## Recovery policy
//!
//! [`LogStore::scan`] walks the file in order and stops at the first frame
//! that is incomplete or fails its CRC. Everything before that point is the
//! recovered log; everything after is a torn tail from a non-atomic write
//! and is discarded as if it never happened. A CRC mismatch here is the
//! designed termination signal, not an error condition - only genuine I/O
//! failures propagate.

use crate::error::CaskResult;
use crate::frame::Frame;
use caskdb_storage::StorageBackend;
use std::path::Path;
use tracing::warn;

/// Location of an appended frame within the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    /// Offset of the frame's first byte.
    pub offset: u64,
    /// Total encoded frame length.
    pub len: u32,
    /// Offset of the payload within the file.
    pub payload_offset: u64,
    /// Payload length in bytes.
    pub payload_len: u32,
}

/// One frame recovered by a scan.
#[derive(Debug)]
pub struct ScanEntry {
    /// The decoded frame.
    pub frame: Frame,
    /// Where it lives in the file.
    pub handle: FrameHandle,
}

/// Result of a recovery scan.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Frames in file order, complete and checksum-valid.
    pub entries: Vec<ScanEntry>,
    /// Offset just past the last valid frame.
    pub logical_end: u64,
}

/// An append-only, checksummed frame log over a storage backend.
///
/// The log owns its backend exclusively; the cask above serializes all
/// writers. Appends are visible to reads immediately; durability is
/// deferred until [`flush`](Self::flush)/[`sync`](Self::sync).
pub struct LogStore {
    backend: Box<dyn StorageBackend>,
}

impl LogStore {
    /// Creates a log store over a backend.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Appends a single frame, returning its location.
    pub fn append(&mut self, frame: &Frame) -> CaskResult<FrameHandle> {
        let encoded = frame.encode();
        let offset = self.backend.append(&encoded)?;
        Ok(Self::handle_for(frame, offset, encoded.len()))
    }

    /// Appends a batch of frames as one backend write.
    ///
    /// This is the `put_all` path: n frames cost one I/O operation.
    pub fn append_batch(&mut self, frames: &[Frame]) -> CaskResult<Vec<FrameHandle>> {
        let mut buf = Vec::new();
        let mut relative = Vec::with_capacity(frames.len());

        for frame in frames {
            relative.push((buf.len() as u64, frame));
            buf.extend_from_slice(&frame.encode());
        }

        let base = self.backend.append(&buf)?;
        Ok(relative
            .into_iter()
            .map(|(delta, frame)| {
                Self::handle_for(frame, base + delta, frame.encoded_size())
            })
            .collect())
    }

    fn handle_for(frame: &Frame, offset: u64, len: usize) -> FrameHandle {
        FrameHandle {
            offset,
            len: len as u32,
            payload_offset: offset + frame.payload_offset() as u64,
            payload_len: frame.payload.len() as u32,
        }
    }

    /// Scans the log from the start, stopping at the first incomplete or
    /// checksum-invalid frame.
    ///
    /// # Errors
    ///
    /// Only genuine I/O failures. Corruption never surfaces from a scan.
    pub fn scan(&self) -> CaskResult<ScanOutcome> {
        let size = self.backend.size()?;
        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset < size {
            if offset + 4 > size {
                warn!(offset, "torn frame header at log tail");
                break;
            }

            let len_bytes = self.backend.read_at(offset, 4)?;
            let frame_len =
                u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                    as u64;

            if frame_len < 4 || offset + frame_len > size {
                warn!(offset, frame_len, "torn frame body at log tail");
                break;
            }

            let data = self.backend.read_at(offset, frame_len as usize)?;
            match Frame::decode(&data) {
                Ok(frame) => {
                    let handle = Self::handle_for(&frame, offset, frame_len as usize);
                    entries.push(ScanEntry { frame, handle });
                    offset += frame_len;
                }
                Err(e) if e.ends_scan() => {
                    warn!(offset, error = %e, "invalid frame ends recovery scan");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ScanOutcome {
            entries,
            logical_end: offset,
        })
    }

    /// Reads a payload previously located by the index.
    pub fn read_payload(&self, offset: u64, len: u32) -> CaskResult<Vec<u8>> {
        Ok(self.backend.read_at(offset, len as usize)?)
    }

    /// Drops everything at and after `offset`.
    pub fn truncate(&mut self, offset: u64) -> CaskResult<()> {
        self.backend.truncate(offset)?;
        Ok(())
    }

    /// Flushes buffered writes to the OS.
    pub fn flush(&mut self) -> CaskResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Syncs all data to durable storage.
    pub fn sync(&mut self) -> CaskResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Current log size in bytes.
    pub fn size(&self) -> CaskResult<u64> {
        Ok(self.backend.size()?)
    }

    /// The filesystem path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.backend.path()
    }

    /// Replaces the backend, used by the compaction file swap.
    pub fn replace_backend(&mut self, backend: Box<dyn StorageBackend>) {
        self.backend = backend;
    }

    /// Consumes the store, returning its backend.
    #[must_use]
    pub fn into_backend(self) -> Box<dyn StorageBackend> {
        self.backend
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("size", &self.backend.size().ok())
            .field("path", &self.backend.path())
            .finish_non_exhaustive()
    }
}
