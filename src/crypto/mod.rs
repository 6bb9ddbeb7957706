//! Authenticated encryption primitives
//!
//! Every table file, index file, and WAL entry this crate writes to disk is
//! wrapped in AES-256-GCM. This module owns the only two operations that
//! touch raw key material directly: [`encrypt`]/[`decrypt`], and the PBKDF2
//! derivation used to produce a WAL-specific key from the master key.
//!
//! ## Wire format
//!
//! Encrypted blobs are rendered as three hex-encoded, colon-separated
//! fields: `iv:tag:ciphertext`. The IV is 16 bytes (not the 12 bytes AES-GCM
//! implementations usually default to) — see [`IV_LEN`] for why.
//!
//! ## Key handling
//!
//! [`Key`] wraps the raw bytes in a type that zeroizes itself on drop, so an
//! `Engine::close()` that drops its last `Key` leaves no copy of the master
//! key resident in memory.

#[cfg(test)]
mod tests;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length, in bytes, of the IV carried in every encrypted blob.
///
/// AES-GCM's recommended nonce size is 12 bytes, but this store's wire
/// format predates that guidance and used a 16-byte IV truncated into the
/// cipher's nonce slot. Kept at 16 for compatibility with files already on
/// disk; new deployments get no weaker a guarantee since the IV is still
/// drawn fresh from a CSPRNG on every call (see the Open Questions note in
/// `DESIGN.md`).
pub const IV_LEN: usize = 16;

/// Length, in bytes, of the master/derived encryption key.
pub const KEY_LEN: usize = 32;

/// Length, in bytes, of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count used to derive the WAL key.
///
/// This is a compatibility anchor, not a tunable: raising it changes the
/// derived key for existing salts and breaks recovery of WALs written under
/// the old iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Errors raised by encryption, decryption, and key derivation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CryptoError {
    /// GCM tag verification failed, or the cipher rejected its input outright.
    #[error("authentication failed")]
    AuthFailed,

    /// A hex-encoded blob was malformed (wrong number of fields, bad hex, wrong lengths).
    #[error("malformed encrypted blob: {0}")]
    Malformed(String),

    /// Key material has been zeroized and can no longer be used.
    #[error("key has been zeroized")]
    KeyZeroized,
}

/// A 32-byte key that zeroizes its backing memory when dropped.
///
/// Holds either the master key handed to [`crate::engine::Engine::open`] or a
/// key derived from it via [`derive_wal_key`]. Cloning is intentionally not
/// derived — every holder of a `Key` owns a single buffer whose lifetime is
/// explicit.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Wraps raw key bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generates a fresh key from a cryptographically secure RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Borrows the raw bytes. Does not extend their lifetime past `self`.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// `true` once the buffer has been explicitly zeroized while still reachable.
    pub fn is_zeroized(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key").field("bytes", &"<redacted>").finish()
    }
}

/// Generates 32 random bytes suitable for a WAL key-derivation salt.
pub fn generate_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives a WAL-specific key from the master key and a stored salt via
/// PBKDF2-HMAC-SHA256.
pub fn derive_wal_key(master_key: &Key, salt: &[u8; 32]) -> Result<Key, CryptoError> {
    if master_key.is_zeroized() {
        return Err(CryptoError::KeyZeroized);
    }
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(master_key.as_bytes(), salt, PBKDF2_ITERATIONS, &mut out);
    Ok(Key::new(out))
}

/// Encrypts `plaintext` under `key`, returning the hex `iv:tag:ciphertext` triple.
///
/// A fresh IV is drawn from the OS RNG on every call; nonce reuse is the one
/// mistake this API cannot recover from if a caller forges its own IV, so no
/// caller-supplied-IV path is exposed.
pub fn encrypt(key: &Key, plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::AuthFailed)?;
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv[..12]);

    let ciphertext_and_tag = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::AuthFailed)?;

    let (ciphertext, tag) = ciphertext_and_tag.split_at(ciphertext_and_tag.len() - TAG_LEN);

    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(ciphertext)
    ))
}

/// Decrypts a hex `iv:tag:ciphertext` triple produced by [`encrypt`].
pub fn decrypt(key: &Key, encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let mut parts = encoded.splitn(3, ':');
    let iv_hex = parts
        .next()
        .ok_or_else(|| CryptoError::Malformed("missing iv field".into()))?;
    let tag_hex = parts
        .next()
        .ok_or_else(|| CryptoError::Malformed("missing tag field".into()))?;
    let ciphertext_hex = parts
        .next()
        .ok_or_else(|| CryptoError::Malformed("missing ciphertext field".into()))?;

    let iv = hex::decode(iv_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let tag = hex::decode(tag_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let ciphertext = hex::decode(ciphertext_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;

    if iv.len() != IV_LEN {
        return Err(CryptoError::Malformed(format!(
            "iv must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::Malformed(format!(
            "tag must be {TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }
    if ciphertext.is_empty() {
        return Err(CryptoError::Malformed("empty ciphertext".into()));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::AuthFailed)?;
    let nonce = Nonce::from_slice(&iv[..12]);

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&ciphertext);
    combined.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &combined,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::AuthFailed)?;

    Ok(plaintext)
}
