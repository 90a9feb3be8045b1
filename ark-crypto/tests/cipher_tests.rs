use ark_crypto::{
    decrypt, derive_key, encrypt, generate_random_key, CryptoError, DataEncryptor, DerivedKey,
    EncryptedBlob, KdfParams, KeyEncryptor, Salt, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};

#[test]
fn encrypt_decrypt_roundtrip() {
    let key = generate_random_key();
    let blob = encrypt(&key, b"hello vault").unwrap();
    assert_eq!(decrypt(&key, blob.as_bytes()).unwrap(), b"hello vault");
}

#[test]
fn blob_layout_is_nonce_then_ciphertext_and_tag() {
    let key = generate_random_key();
    let plaintext = b"twelve bytes";
    let blob = encrypt(&key, plaintext).unwrap();
    assert_eq!(blob.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    assert_eq!(blob.nonce().unwrap().len(), NONCE_SIZE);
}

#[test]
fn empty_plaintext_roundtrips() {
    let key = generate_random_key();
    let blob = encrypt(&key, b"").unwrap();
    assert_eq!(blob.len(), NONCE_SIZE + TAG_SIZE);
    assert!(decrypt(&key, blob.as_bytes()).unwrap().is_empty());
}

#[test]
fn same_plaintext_encrypts_differently() {
    let key = generate_random_key();
    let a = encrypt(&key, b"same").unwrap();
    let b = encrypt(&key, b"same").unwrap();
    assert_ne!(a.nonce(), b.nonce());
    assert_ne!(a, b);
}

#[test]
fn nonces_do_not_repeat_over_many_calls() {
    let key = generate_random_key();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1000 {
        let blob = encrypt(&key, b"x").unwrap();
        assert!(seen.insert(blob.nonce().unwrap().to_vec()));
    }
}

#[test]
fn wrong_key_fails() {
    let blob = encrypt(&generate_random_key(), b"secret").unwrap();
    let err = decrypt(&generate_random_key(), blob.as_bytes()).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn truncated_blob_fails() {
    let key = generate_random_key();
    let err = decrypt(&key, &[0u8; NONCE_SIZE - 1]).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(ref m) if m.contains("too short")));

    let blob = encrypt(&key, b"secret").unwrap();
    let cut = &blob.as_bytes()[..blob.len() - 1];
    assert!(decrypt(&key, cut).is_err());
}

#[test]
fn key_from_slice_validates_length() {
    assert!(DerivedKey::from_slice(&[7u8; KEY_SIZE]).is_ok());
    let err = DerivedKey::from_slice(&[7u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        CryptoError::InvalidKeyLength { expected: 32, actual: 16 }
    ));
}

#[test]
fn derived_key_encrypts_like_any_key() {
    let salt = Salt::random();
    let key = derive_key("master password", &salt, &KdfParams::insecure_fast()).unwrap();
    let again = derive_key("master password", &salt, &KdfParams::insecure_fast()).unwrap();

    let blob = encrypt(&key, b"data").unwrap();
    assert_eq!(decrypt(&again, blob.as_bytes()).unwrap(), b"data");
}

#[test]
fn default_kdf_params_match_installed_format() {
    let params = KdfParams::default();
    assert_eq!(params.iterations, 1);
    assert_eq!(params.memory_kib, 65536);
    assert_eq!(params.parallelism, 4);
}

#[test]
fn key_encryptor_roundtrip() {
    let enc = KeyEncryptor::new(generate_random_key());
    let ct = enc.encrypt_bytes(b"{\"a\":1}").unwrap();
    assert_ne!(ct, b"{\"a\":1}");
    assert_eq!(enc.decrypt_bytes(&ct).unwrap(), b"{\"a\":1}");
}

#[test]
fn blob_from_bytes_roundtrip() {
    let key = generate_random_key();
    let blob = encrypt(&key, b"persisted").unwrap();
    let restored = EncryptedBlob::from_bytes(blob.clone().into_bytes());
    assert_eq!(restored, blob);
    assert_eq!(decrypt(&key, restored.as_ref()).unwrap(), b"persisted");
}

// Property-based tests
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn encrypt_decrypt_always_roundtrips(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = generate_random_key();
            let blob = encrypt(&key, &data).unwrap();
            prop_assert_eq!(decrypt(&key, blob.as_bytes()).unwrap(), data);
        }

        #[test]
        fn any_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 0..128),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = generate_random_key();
            let mut bytes = encrypt(&key, &data).unwrap().into_bytes();
            let idx = position.index(bytes.len());
            bytes[idx] ^= 1 << bit;
            prop_assert!(decrypt(&key, &bytes).is_err());
        }
    }
}
