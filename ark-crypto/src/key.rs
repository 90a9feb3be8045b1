//! Key material and password-based key derivation.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of a key-derivation salt in bytes.
pub const SALT_SIZE: usize = 32;

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, rejecting anything that isn't exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Random salt mixed into password-based key derivation.
///
/// Not secret (it is persisted in plaintext next to the configuration), but
/// still zeroized on drop so stale copies don't linger.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh salt from the CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SALT_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidSaltLength {
            expected: SALT_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// Time cost 1, 64 MiB, 4 lanes. Changing these breaks every existing
    /// installation, since keys are never stored.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Minimal-cost parameters for tests. Never use for real data.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 32,
            iterations: 1,
            parallelism: 4,
        }
    }
}

/// Derives a 256-bit key from a password and salt with Argon2id (v0x13).
///
/// Deterministic: the same password, salt and parameters always produce the
/// same key.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let key = DerivedKey::from_bytes(out);
    out.zeroize();
    Ok(key)
}

/// Generates a random 256-bit key (used for backup keys and in tests).
pub fn generate_random_key() -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rng().fill_bytes(&mut bytes);
    let key = DerivedKey::from_bytes(bytes);
    bytes.zeroize();
    key
}

/// Re-derives a key from `password` and compares it to `expected` in
/// constant time.
pub fn verify_password(
    password: &str,
    expected: &DerivedKey,
    salt: &Salt,
    params: &KdfParams,
) -> bool {
    match derive_key(password, salt, params) {
        Ok(candidate) => constant_time_eq(candidate.as_bytes(), expected.as_bytes()),
        Err(_) => false,
    }
}

/// Deterministic key for the on-disk master key cache.
///
/// `SHA-256(config_dir || salt)` ties a cache file to one installation: copying
/// it next to a different configuration directory or salt makes it unreadable.
pub fn cache_key(config_dir: &str, salt: &Salt) -> DerivedKey {
    let mut hasher = Sha256::new();
    hasher.update(config_dir.as_bytes());
    hasher.update(salt.as_bytes());
    let digest: [u8; KEY_SIZE] = hasher.finalize().into();
    DerivedKey::from_bytes(digest)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
