//! Encryption layer for Ark.
//!
//! Provides the single cryptographic primitive shared by every other crate:
//! - Argon2id for key derivation from passwords
//! - AES-256-GCM for authenticated encryption of opaque byte blobs
//! - Key and salt types that zeroize on drop
//!
//! # Wire format
//!
//! Every encrypted value is an `EncryptedBlob`:
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! The nonce is drawn fresh from the CSPRNG on every call to [`encrypt`], so
//! encrypting the same plaintext twice under the same key never yields the
//! same bytes.

mod cipher;
pub mod encryptor;
mod error;
mod key;

pub use cipher::{decrypt, encrypt, EncryptedBlob, NONCE_SIZE, TAG_SIZE};
pub use encryptor::{DataEncryptor, KeyEncryptor};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    cache_key, derive_key, generate_random_key, verify_password, DerivedKey, KdfParams, Salt,
    KEY_SIZE, SALT_SIZE,
};
