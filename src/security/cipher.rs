// src/security/cipher.rs - Sealing keystroke timings at rest
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

use crate::db::models::EncryptedPattern;
use crate::models::{KeyTiming, KeystrokePattern};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CipherError {
    #[error("Invalid key size: expected 32 bytes")]
    InvalidKeySize,

    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("Invalid nonce size")]
    InvalidNonce,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Seals the timing vector of a pattern; the envelope fields stay readable
pub trait PatternEncryptor: Send + Sync {
    fn encrypt(&self, pattern: &KeystrokePattern) -> Result<EncryptedPattern, CipherError>;
    fn decrypt(&self, sealed: &EncryptedPattern) -> Result<KeystrokePattern, CipherError>;
}

/// ChaCha20-Poly1305 with a random nonce per pattern and the pattern id as AAD
pub struct ChaChaPatternEncryptor {
    key: [u8; KEY_SIZE],
}

impl ChaChaPatternEncryptor {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeySize);
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(key);
        Ok(Self { key: bytes })
    }

    /// Key given as 64 hex characters
    pub fn from_hex(encoded: &str) -> Result<Self, CipherError> {
        let mut decoded = hex::decode(encoded.trim()).map_err(|e| CipherError::InvalidKeyEncoding(e.to_string()))?;
        let result = Self::new(&decoded);
        decoded.zeroize();
        result
    }

    /// Fresh random key, for deployments without a configured one
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        let encryptor = Self { key };
        key.zeroize();
        encryptor
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, CipherError> {
        ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| CipherError::InvalidKeySize)
    }
}

impl Drop for ChaChaPatternEncryptor {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl PatternEncryptor for ChaChaPatternEncryptor {
    fn encrypt(&self, pattern: &KeystrokePattern) -> Result<EncryptedPattern, CipherError> {
        let mut plaintext = serde_json::to_vec(&pattern.timings).map_err(|e| CipherError::Serialization(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let aad = pattern.pattern_id.as_bytes();
        let sealed = self.cipher()?.encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload { msg: &plaintext, aad },
        );
        plaintext.zeroize();

        Ok(EncryptedPattern {
            pattern_id: pattern.pattern_id,
            user_id: pattern.user_id,
            context: pattern.context,
            timestamp: pattern.timestamp,
            device_id: pattern.device_id.clone(),
            nonce: nonce_bytes.to_vec(),
            ciphertext: sealed.map_err(|_| CipherError::EncryptionFailed)?,
        })
    }

    fn decrypt(&self, sealed: &EncryptedPattern) -> Result<KeystrokePattern, CipherError> {
        if sealed.nonce.len() != NONCE_SIZE {
            return Err(CipherError::InvalidNonce);
        }

        let mut plaintext = self
            .cipher()?
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload { msg: &sealed.ciphertext, aad: sealed.pattern_id.as_bytes() },
            )
            .map_err(|_| CipherError::DecryptionFailed)?;

        let timings: Result<Vec<KeyTiming>, _> = serde_json::from_slice(&plaintext);
        plaintext.zeroize();

        Ok(KeystrokePattern {
            pattern_id: sealed.pattern_id,
            user_id: sealed.user_id,
            context: sealed.context,
            timings: timings.map_err(|e| CipherError::Serialization(e.to_string()))?,
            timestamp: sealed.timestamp,
            device_id: sealed.device_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::fixtures::typed;
    use uuid::Uuid;

    #[test]
    fn test_encrypt_decrypt() {
        let encryptor = ChaChaPatternEncryptor::generate();
        let mut pattern = typed(Uuid::new_v4(), "secret", 90, 140, 1_000);
        pattern.device_id = Some("laptop".to_string());

        let sealed = encryptor.encrypt(&pattern).unwrap();
        assert_eq!(sealed.nonce.len(), NONCE_SIZE);
        assert!(!String::from_utf8_lossy(&sealed.ciphertext).contains("pressTime"));

        assert_eq!(encryptor.decrypt(&sealed).unwrap(), pattern);
    }

    #[test]
    fn test_nonces_are_not_reused() {
        let encryptor = ChaChaPatternEncryptor::generate();
        let pattern = typed(Uuid::new_v4(), "abc", 80, 120, 0);

        let first = encryptor.encrypt(&pattern).unwrap();
        let second = encryptor.encrypt(&pattern).unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let encryptor = ChaChaPatternEncryptor::generate();
        let mut sealed = encryptor.encrypt(&typed(Uuid::new_v4(), "abc", 80, 120, 0)).unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        assert_eq!(encryptor.decrypt(&sealed), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn test_swapped_pattern_id_fails() {
        let encryptor = ChaChaPatternEncryptor::generate();
        let mut sealed = encryptor.encrypt(&typed(Uuid::new_v4(), "abc", 80, 120, 0)).unwrap();
        sealed.pattern_id = Uuid::new_v4();
        assert_eq!(encryptor.decrypt(&sealed), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = ChaChaPatternEncryptor::generate()
            .encrypt(&typed(Uuid::new_v4(), "abc", 80, 120, 0))
            .unwrap();
        let other = ChaChaPatternEncryptor::generate();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_key_parsing() {
        let key = "00".repeat(KEY_SIZE);
        assert!(ChaChaPatternEncryptor::from_hex(&key).is_ok());
        assert_eq!(ChaChaPatternEncryptor::new(&[0u8; 16]).err(), Some(CipherError::InvalidKeySize));
        assert!(matches!(
            ChaChaPatternEncryptor::from_hex("not-hex"),
            Err(CipherError::InvalidKeyEncoding(_))
        ));
    }
}
