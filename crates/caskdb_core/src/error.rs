//! Error types for the caskdb engine.

use std::io;
use thiserror::Error;

/// Result type for cask operations.
pub type CaskResult<T> = Result<T, CaskError>;

/// Errors that can occur in cask operations.
#[derive(Debug, Error)]
pub enum CaskError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] caskdb_storage::StorageError),

    /// Codec error, including the schema-error family
    /// (unknown type, duplicate type id, field kind mismatch).
    #[error("codec error: {0}")]
    Codec(#[from] caskdb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame's structure is invalid.
    ///
    /// During a recovery scan this is a termination signal, not a failure;
    /// it only surfaces from random-access reads of known-good offsets.
    #[error("corrupt frame: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// A frame's stored CRC does not match its contents.
    ///
    /// Like [`Corruption`](Self::Corruption), this is the designed
    /// end-of-log signal during a recovery scan.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// CRC stored in the frame.
        expected: u32,
        /// CRC computed over the frame bytes.
        actual: u32,
    },

    /// Fewer bytes were available than a complete frame requires.
    #[error("incomplete frame")]
    IncompleteFrame,

    /// The cask has been closed.
    #[error("cask is closed")]
    CaskClosed,

    /// Another handle holds this cask's lock file.
    #[error("cask is locked: another handle has exclusive access")]
    LockHeld,

    /// Payload encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Payload decryption failed (wrong key or corrupted ciphertext).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// A cipher key of the wrong length was supplied.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },
}

impl CaskError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Whether this error is one of the recovery-scan termination signals.
    #[must_use]
    pub(crate) fn ends_scan(&self) -> bool {
        matches!(
            self,
            Self::IncompleteFrame | Self::ChecksumMismatch { .. } | Self::Corruption { .. }
        )
    }
}
