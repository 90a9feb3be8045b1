//! AES-256-GCM authenticated encryption.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// `nonce || ciphertext || tag`, as produced by [`encrypt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    /// Wraps raw bytes read from disk or the store. No validation happens
    /// until [`decrypt`] is called.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The nonce prefix, if the blob is long enough to carry one.
    pub fn nonce(&self) -> Option<&[u8]> {
        self.0.get(..NONCE_SIZE)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for EncryptedBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<EncryptedBlob> for Vec<u8> {
    fn from(blob: EncryptedBlob) -> Self {
        blob.0
    }
}

fn cipher_for(key: &DerivedKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedBlob> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher_for(key)
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(EncryptedBlob(out))
}

/// Decrypts and authenticates a blob produced by [`encrypt`].
///
/// Any modification of the nonce, ciphertext or tag is rejected; corrupted
/// plaintext is never returned.
pub fn decrypt(key: &DerivedKey, blob: &[u8]) -> CryptoResult<Vec<u8>> {
    if blob.len() < NONCE_SIZE {
        return Err(CryptoError::Decryption("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

    cipher_for(key)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })
}
