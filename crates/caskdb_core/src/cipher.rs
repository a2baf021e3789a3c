//! Payload encryption using AES-256-GCM.
//!
//! Only the frame payload is encrypted: header, key bytes, and CRC stay in
//! the clear so a recovery scan works without the cipher key while payload
//! content stays opaque without it. The key is supplied by the caller at
//! open time and never persisted by the engine.

use crate::error::{CaskError, CaskResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key for a cask's payloads.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: [u8; KEY_SIZE],
}

impl CipherKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CaskError::InvalidKeySize`] unless exactly 32 bytes are
    /// supplied.
    pub fn from_bytes(bytes: &[u8]) -> CaskResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CaskError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a password using HKDF-SHA256.
    ///
    /// The salt should be random, unique per cask, and stored by the
    /// caller - the engine never writes key material. HKDF is a key
    /// derivation function, not a password hash; for low-entropy
    /// user-chosen passwords run them through a password hash first.
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> CaskResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), password);

        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"caskdb-payload-key-v1", &mut bytes)
            .map_err(|_| CaskError::encryption_failed("HKDF expand failed"))?;

        Ok(Self { bytes })
    }

    /// Returns the raw key bytes. Do not log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts frame payloads.
pub struct FrameCipher {
    cipher: Aes256Gcm,
}

impl FrameCipher {
    /// Creates a cipher from a key.
    #[must_use]
    pub fn new(key: &CipherKey) -> Self {
        // Infallible: CipherKey is always exactly the AES-256 key size.
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Encrypts a payload.
    ///
    /// Output is `nonce (12) || ciphertext || tag (16)` with a fresh
    /// random nonce per call.
    pub fn encrypt(&self, plaintext: &[u8]) -> CaskResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CaskError::encryption_failed("AEAD encryption error"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);

        Ok(result)
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`CaskError::DecryptionFailed`] for a wrong key or
    /// tampered ciphertext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CaskResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CaskError::decryption_failed("ciphertext too short"));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let encrypted = &ciphertext[NONCE_SIZE..];

        self.cipher
            .decrypt(nonce, encrypted)
            .map_err(|_| CaskError::decryption_failed("AEAD decryption error"))
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let key1 = CipherKey::generate();
        let key2 = CipherKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn from_bytes_checks_size() {
        assert!(CipherKey::from_bytes(&[42u8; KEY_SIZE]).is_ok());
        assert!(matches!(
            CipherKey::from_bytes(&[0u8; 16]),
            Err(CaskError::InvalidKeySize { .. })
        ));
        assert!(matches!(
            CipherKey::from_bytes(&[0u8; 64]),
            Err(CaskError::InvalidKeySize { .. })
        ));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = FrameCipher::new(&CipherKey::generate());

        let plaintext = b"payload bytes";
        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_ne!(&ciphertext[NONCE_SIZE..], plaintext);

        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn nonces_make_ciphertexts_differ() {
        let cipher = FrameCipher::new(&CipherKey::generate());
        let ct1 = cipher.encrypt(b"same").unwrap();
        let ct2 = cipher.encrypt(b"same").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn wrong_key_fails() {
        let cipher1 = FrameCipher::new(&CipherKey::generate());
        let cipher2 = FrameCipher::new(&CipherKey::generate());

        let ciphertext = cipher1.encrypt(b"secret").unwrap();
        assert!(cipher2.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = FrameCipher::new(&CipherKey::generate());
        let mut ciphertext = cipher.encrypt(b"data").unwrap();

        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(cipher.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn short_ciphertext_fails() {
        let cipher = FrameCipher::new(&CipherKey::generate());
        assert!(cipher.decrypt(&[0u8; 10]).is_err());
    }

    #[test]
    fn password_derivation_is_deterministic() {
        let key1 = CipherKey::derive_from_password(b"passphrase", b"salt").unwrap();
        let key2 = CipherKey::derive_from_password(b"passphrase", b"salt").unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let key3 = CipherKey::derive_from_password(b"passphrase", b"other").unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());
    }

    #[test]
    fn empty_payload_roundtrip() {
        let cipher = FrameCipher::new(&CipherKey::generate());
        let ciphertext = cipher.encrypt(b"").unwrap();
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), b"");
    }
}
