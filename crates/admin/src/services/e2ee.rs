//! End-to-end encryption for chat messages.
//!
//! Keys are derived deterministically from the room ID so any participant
//! who knows the room can re-derive the same key without a key-exchange
//! step. This is opportunistic confidentiality against passive storage
//! inspection; it is not forward-secure and does not defend against a
//! party that can read room IDs server-side.
//!
//! Wire format: `base64(nonce ‖ ciphertext)` with a 96-bit random nonce.
//! Nonce reuse under one key is the only catastrophic failure mode, so the
//! nonce is freshly sampled inside [`encrypt`] and never accepted from a
//! caller.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;

use ridgeline_core::ChatRoomId;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// PBKDF2 iteration count for room key derivation.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed salt for room key derivation. Shared by every participant; the
/// room ID provides the per-room variation.
const KEY_SALT: &[u8] = b"ridgeline-e2ee-salt";

/// A 256-bit symmetric room key.
///
/// `Debug` redacts the key material.
#[derive(Clone)]
pub struct RoomKey([u8; 32]);

impl RoomKey {
    /// Wrap raw key bytes. Intended for tests and alternate derivations.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RoomKey").field(&"[REDACTED]").finish()
    }
}

/// Derives a symmetric key from a room ID.
///
/// Behind a trait so a future scheme (per-message ephemeral keys,
/// out-of-band exchange) can swap in without touching encrypt/decrypt
/// call sites.
pub trait KeyDerivation: Send + Sync {
    /// Derive the key for a room.
    fn derive_key(&self, room_id: ChatRoomId) -> RoomKey;
}

/// The deterministic passphrase-template derivation.
///
/// PBKDF2-HMAC-SHA256 over `rl-room-{room_id}-e2ee` with a fixed salt and
/// 100,000 iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassphraseDerivation;

impl KeyDerivation for PassphraseDerivation {
    fn derive_key(&self, room_id: ChatRoomId) -> RoomKey {
        let passphrase = format!("rl-room-{room_id}-e2ee");
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KEY_SALT, PBKDF2_ITERATIONS, &mut key);
        RoomKey(key)
    }
}

/// Errors that can occur while encrypting.
#[derive(Debug, Error)]
pub enum EncryptError {
    /// The AEAD backend rejected the payload.
    #[error("encryption failed")]
    Aead,
}

/// Errors that can occur while decrypting.
///
/// Callers render these per-message as a placeholder; a bad message never
/// takes down the surrounding view.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// The blob is not valid base64.
    #[error("ciphertext is not valid base64")]
    Encoding,

    /// The blob is shorter than a nonce.
    #[error("ciphertext is truncated")]
    Truncated,

    /// Authentication failed: wrong key, corrupted or tampered payload.
    #[error("authentication failed")]
    Authentication,

    /// The decrypted payload is not UTF-8 text.
    #[error("plaintext is not valid UTF-8")]
    Utf8,
}

/// Encrypt a plaintext under a room key.
///
/// A fresh 96-bit nonce is sampled per call and prepended to the
/// ciphertext before base64 encoding.
///
/// # Errors
///
/// Returns [`EncryptError::Aead`] if the AEAD backend fails, which for
/// AES-GCM only happens on pathological payload sizes.
pub fn encrypt(plaintext: &str, key: &RoomKey) -> Result<String, EncryptError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| EncryptError::Aead)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(blob))
}

/// Decrypt a `base64(nonce ‖ ciphertext)` blob under a room key.
///
/// # Errors
///
/// Returns a [`DecryptError`] for malformed encoding, truncated input,
/// authentication failure, or non-UTF-8 plaintext.
pub fn decrypt(blob: &str, key: &RoomKey) -> Result<String, DecryptError> {
    let combined = BASE64.decode(blob).map_err(|_| DecryptError::Encoding)?;

    if combined.len() < NONCE_LEN {
        return Err(DecryptError::Truncated);
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| DecryptError::Authentication)?;

    String::from_utf8(plaintext).map_err(|_| DecryptError::Utf8)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn room_key() -> RoomKey {
        PassphraseDerivation.derive_key(ChatRoomId::generate())
    }

    #[test]
    fn test_round_trip() {
        let key = room_key();
        for message in ["", "hi", "a longer message with spaces", "emoji 🔒"] {
            let blob = encrypt(message, &key).unwrap();
            assert_eq!(decrypt(&blob, &key).unwrap(), message);
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let room = ChatRoomId::generate();
        let a = PassphraseDerivation.derive_key(room);
        let b = PassphraseDerivation.derive_key(room);

        let blob = encrypt("shared secret", &a).unwrap();
        assert_eq!(decrypt(&blob, &b).unwrap(), "shared secret");
    }

    #[test]
    fn test_wrong_room_key_fails_authentication() {
        let key = PassphraseDerivation.derive_key(ChatRoomId::generate());
        let other = PassphraseDerivation.derive_key(ChatRoomId::generate());

        let blob = encrypt("for one room only", &key).unwrap();
        assert!(matches!(
            decrypt(&blob, &other),
            Err(DecryptError::Authentication)
        ));
    }

    #[test]
    fn test_corrupted_blob_fails() {
        let key = room_key();
        let blob = encrypt("payload", &key).unwrap();

        let mut bytes = BASE64.decode(&blob).unwrap();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        let tampered = BASE64.encode(bytes);

        assert!(matches!(
            decrypt(&tampered, &key),
            Err(DecryptError::Authentication)
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let key = room_key();
        assert!(matches!(
            decrypt("not-base64!!!", &key),
            Err(DecryptError::Encoding)
        ));
        assert!(matches!(
            decrypt(&BASE64.encode([0u8; 5]), &key),
            Err(DecryptError::Truncated)
        ));
    }

    #[test]
    fn test_nonces_are_unique_across_many_encryptions() {
        let key = room_key();
        let mut nonces = HashSet::new();

        for _ in 0..10_000 {
            let blob = encrypt("same plaintext", &key).unwrap();
            let bytes = BASE64.decode(&blob).unwrap();
            let nonce: Vec<u8> = bytes.iter().take(NONCE_LEN).copied().collect();
            assert!(nonces.insert(nonce), "nonce repeated");
        }
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let key = room_key();
        let a = encrypt("identical", &key).unwrap();
        let b = encrypt("identical", &key).unwrap();
        assert_ne!(a, b);
    }
}
