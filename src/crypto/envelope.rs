//! AES-256-GCM envelope encryption.
//!
//! Every record gets its own random data key. The payload is sealed under the
//! data key, then the data key is sealed under the long-lived master key. Both
//! seals use independent random nonces, so two encryptions of the same
//! plaintext never share a key, a nonce or a ciphertext.
//!
//! ```text
//!   plaintext ──(data key, data_nonce)──────▶ ciphertext
//!   data key  ──(master key, data_key_nonce)─▶ encrypted_data_key
//! ```

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of master and data keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
pub const NONCE_SIZE: usize = 12;

/// Errors raised by the envelope cipher.
///
/// Decryption failures are coarse: a bad tag, a bad nonce and a
/// corrupted wrapped key are indistinguishable to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("master key must be 32 bytes (256 bits), got {0} bytes")]
    InvalidKeyLength(usize),

    #[error("master key is not valid base64")]
    InvalidKeyEncoding,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,
}

/// Long-lived key that wraps per-record data keys.
///
/// The bytes are wiped when the key is dropped and never printed by `Debug`.
pub struct MasterKey(Zeroizing<[u8; KEY_SIZE]>);

impl MasterKey {
    /// Generates a fresh random master key.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self(bytes)
    }

    /// Builds a key from raw bytes, which must be exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeyLength(bytes.len()));
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Decodes a base64 master key and validates its length.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|_| CipherError::InvalidKeyEncoding)?,
        );
        Self::from_bytes(&decoded)
    }

    /// Reads a base64 master key from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let encoded = Zeroizing::new(
            std::env::var(var).with_context(|| format!("{} is not set", var))?,
        );
        Self::from_base64(&encoded).with_context(|| format!("Invalid master key in {}", var))
    }

    /// Base64 form, suitable for handing to an operator exactly once.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0[..])
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0[..]))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// The four persisted components of an envelope-encrypted secret.
///
/// All four must be present; a record missing any of them is corrupt.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct EncryptedSecret {
    pub ciphertext: Vec<u8>,
    pub encrypted_data_key: Vec<u8>,
    pub data_nonce: Vec<u8>,
    pub data_key_nonce: Vec<u8>,
}

impl EncryptedSecret {
    pub fn is_complete(&self) -> bool {
        !self.ciphertext.is_empty()
            && !self.encrypted_data_key.is_empty()
            && !self.data_nonce.is_empty()
            && !self.data_key_nonce.is_empty()
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("encrypted_data_key_len", &self.encrypted_data_key.len())
            .field("data_nonce_len", &self.data_nonce.len())
            .field("data_key_nonce_len", &self.data_key_nonce.len())
            .finish()
    }
}

/// Seals and opens secrets under a single master key.
///
/// Stateless apart from the master cipher; safe to share across threads.
pub struct EnvelopeCipher {
    master: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(master_key: &MasterKey) -> Self {
        Self {
            master: master_key.cipher(),
        }
    }

    /// Encrypts `plaintext` under a fresh data key and wraps that key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret, CipherError> {
        let mut data_key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut data_key[..]);
        let data_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&data_key[..]));

        // Generate random nonces (never reuse!)
        let data_nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let data_key_nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = data_cipher
            .encrypt(&data_nonce, plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;
        let encrypted_data_key = self
            .master
            .encrypt(&data_key_nonce, &data_key[..])
            .map_err(|_| CipherError::EncryptionFailed)?;

        Ok(EncryptedSecret {
            ciphertext,
            encrypted_data_key,
            data_nonce: data_nonce.to_vec(),
            data_key_nonce: data_key_nonce.to_vec(),
        })
    }

    /// Unwraps the data key and opens the payload.
    ///
    /// Fails closed: any malformed component or failed tag check yields
    /// [`CipherError::DecryptionFailed`] and no plaintext at all.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        if !secret.is_complete()
            || secret.data_nonce.len() != NONCE_SIZE
            || secret.data_key_nonce.len() != NONCE_SIZE
        {
            return Err(CipherError::DecryptionFailed);
        }

        let data_key = Zeroizing::new(
            self.master
                .decrypt(
                    Nonce::from_slice(&secret.data_key_nonce),
                    secret.encrypted_data_key.as_slice(),
                )
                .map_err(|_| CipherError::DecryptionFailed)?,
        );
        if data_key.len() != KEY_SIZE {
            return Err(CipherError::DecryptionFailed);
        }

        let data_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&data_key));
        let plaintext = data_cipher
            .decrypt(
                Nonce::from_slice(&secret.data_nonce),
                secret.ciphertext.as_slice(),
            )
            .map_err(|_| CipherError::DecryptionFailed)?;

        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> EnvelopeCipher {
        EnvelopeCipher::new(&MasterKey::from_bytes(&[7u8; 32]).unwrap())
    }

    fn field_mut(secret: &mut EncryptedSecret, index: usize) -> &mut Vec<u8> {
        match index {
            0 => &mut secret.ciphertext,
            1 => &mut secret.encrypted_data_key,
            2 => &mut secret.data_nonce,
            _ => &mut secret.data_key_nonce,
        }
    }

    #[test]
    fn test_master_key_validation() {
        let valid = BASE64.encode([0u8; 32]);
        assert!(MasterKey::from_base64(&valid).is_ok());

        let short = BASE64.encode([0u8; 16]);
        assert_eq!(
            MasterKey::from_base64(&short).unwrap_err(),
            CipherError::InvalidKeyLength(16)
        );

        let long = BASE64.encode([0u8; 64]);
        assert_eq!(
            MasterKey::from_base64(&long).unwrap_err(),
            CipherError::InvalidKeyLength(64)
        );

        assert_eq!(
            MasterKey::from_base64("not-valid-base64!@#$").unwrap_err(),
            CipherError::InvalidKeyEncoding
        );
    }

    #[test]
    fn test_generated_key_round_trips_through_base64() {
        let key = MasterKey::generate();
        let restored = MasterKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.to_base64(), restored.to_base64());
        assert_eq!(format!("{:?}", key), "MasterKey(<redacted>)");
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = br#"{"type":"bearer","access_token":"tok-123"}"#;

        let sealed = cipher.encrypt(plaintext).expect("Encryption failed");
        assert!(sealed.is_complete());
        assert_eq!(sealed.data_nonce.len(), NONCE_SIZE);
        assert_eq!(sealed.data_key_nonce.len(), NONCE_SIZE);
        assert_ne!(sealed.ciphertext.as_slice(), plaintext.as_slice());

        let opened = cipher.decrypt(&sealed).expect("Decryption failed");
        assert_eq!(opened.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"").unwrap();
        // GCM tag keeps the ciphertext non-empty
        assert!(sealed.is_complete());
        assert!(cipher.decrypt(&sealed).unwrap().is_empty());
    }

    #[test]
    fn test_each_encryption_is_fresh() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same-plaintext").unwrap();
        let b = cipher.encrypt(b"same-plaintext").unwrap();

        assert_ne!(a, b);
        assert_ne!(a.data_nonce, b.data_nonce);
        assert_ne!(a.data_key_nonce, b.data_key_nonce);
        assert_ne!(a.encrypted_data_key, b.encrypted_data_key);
        assert_ne!(a.ciphertext, b.ciphertext);

        assert_eq!(cipher.decrypt(&a).unwrap().as_slice(), b"same-plaintext");
        assert_eq!(cipher.decrypt(&b).unwrap().as_slice(), b"same-plaintext");
    }

    #[test]
    fn test_single_byte_flip_in_any_component_fails() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"tamper-target").unwrap();

        for index in 0..4 {
            let len = field_mut(&mut sealed.clone(), index).len();
            for position in 0..len {
                let mut tampered = sealed.clone();
                field_mut(&mut tampered, index)[position] ^= 0x01;
                assert!(
                    matches!(cipher.decrypt(&tampered), Err(CipherError::DecryptionFailed)),
                    "component {} byte {} was not detected",
                    index,
                    position
                );
            }
        }
    }

    #[test]
    fn test_wrong_master_key_fails() {
        let sealed = test_cipher().encrypt(b"secret").unwrap();
        let other = EnvelopeCipher::new(&MasterKey::from_bytes(&[8u8; 32]).unwrap());
        assert!(matches!(
            other.decrypt(&sealed),
            Err(CipherError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_nonce_length_fails() {
        let cipher = test_cipher();
        let mut sealed = cipher.encrypt(b"secret").unwrap();
        sealed.data_nonce.push(0);
        assert!(matches!(
            cipher.decrypt(&sealed),
            Err(CipherError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_incomplete_record_fails() {
        let cipher = test_cipher();
        let mut sealed = cipher.encrypt(b"secret").unwrap();
        sealed.encrypted_data_key.clear();
        assert!(!sealed.is_complete());
        assert!(matches!(
            cipher.decrypt(&sealed),
            Err(CipherError::DecryptionFailed)
        ));
        assert!(matches!(
            cipher.decrypt(&EncryptedSecret::default()),
            Err(CipherError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_swapped_envelopes_fail() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"first").unwrap();
        let b = cipher.encrypt(b"second").unwrap();

        let mixed = EncryptedSecret {
            ciphertext: a.ciphertext.clone(),
            data_nonce: a.data_nonce.clone(),
            encrypted_data_key: b.encrypted_data_key.clone(),
            data_key_nonce: b.data_key_nonce.clone(),
        };
        assert!(cipher.decrypt(&mixed).is_err());
    }
}
