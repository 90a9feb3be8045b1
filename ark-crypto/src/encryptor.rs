//! Abstract encryption interface for routing record values through a key.
//!
//! The store depends on `Arc<dyn DataEncryptor>` and never sees raw keys.
//! `KeyEncryptor` is the production implementation, holding the master key.

use crate::cipher::{decrypt, encrypt};
use crate::error::CryptoResult;
use crate::key::DerivedKey;

/// Trait for encrypting/decrypting opaque byte slices.
///
/// Implementations own the key material. Callers never see raw keys.
pub trait DataEncryptor: Send + Sync {
    /// Encrypt `data`, returning an opaque `EncryptedBlob` as bytes.
    fn encrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypt a blob previously produced by `encrypt_bytes`.
    fn decrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Encrypts every value with a single fixed key.
pub struct KeyEncryptor {
    key: DerivedKey,
}

impl KeyEncryptor {
    pub fn new(key: DerivedKey) -> Self {
        Self { key }
    }
}

impl DataEncryptor for KeyEncryptor {
    fn encrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        encrypt(&self.key, data).map(Vec::from)
    }

    fn decrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        decrypt(&self.key, data)
    }
}
