// Credvault: Cipher Service
//
// AES-256-GCM over UTF-8 plaintexts. Each stored token is
//
//     base64( version (1 byte) || nonce (12 bytes) || ciphertext || tag (16 bytes) )
//
// with a fresh random nonce per call, so encrypting the same plaintext twice
// yields different tokens. Any modification of a token is rejected on decrypt.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

use super::provider::{derive_cipher_key, KdfParams, KeyMaterialSource, DERIVED_KEY_LEN};
use super::EnclaveError;

/// Current token format version.
const TOKEN_VERSION: u8 = 1;

/// Nonce length in bytes (96 bits for AES-GCM).
const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
const TAG_LEN: usize = 16;

// ─── Ciphertext ──────────────────────────────────────────────────────────────

/// An opaque encrypted token.
///
/// Only `SecretCipher::encrypt` creates new values; the store rebuilds them
/// from persisted columns. There is no way to wrap arbitrary plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext(String);

impl Ciphertext {
    /// Wrap a token loaded from storage.
    pub(crate) fn from_stored(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext([{} bytes])", self.0.len())
    }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Authenticated symmetric encryption of secrets.
pub trait SecretCipher: Send + Sync {
    /// Encrypt a plaintext into a fresh token.
    fn encrypt(&self, plaintext: &str) -> Result<Ciphertext, EnclaveError>;

    /// Decrypt a token. Fails with `EnclaveError::Decryption` if the token is
    /// malformed, was produced under a different key, or was modified.
    fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Zeroizing<String>, EnclaveError>;
}

// ─── AES-256-GCM ─────────────────────────────────────────────────────────────

/// The production cipher. Holds the derived key for the life of the process;
/// the key is never changed after construction.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build a cipher from an already derived 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, EnclaveError> {
        if key.len() != DERIVED_KEY_LEN {
            return Err(EnclaveError::Derivation(format!(
                "cipher key must be {} bytes, got {}",
                DERIVED_KEY_LEN,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| EnclaveError::Derivation(format!("failed to create cipher: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Load master secret material from `source` and derive the cipher key.
    pub fn from_source(
        source: &dyn KeyMaterialSource,
        kdf: &KdfParams,
    ) -> Result<Self, EnclaveError> {
        let material = source.load()?;
        let key = derive_cipher_key(&material, kdf)?;
        tracing::debug!(source = %source.describe(), "Cipher key derived");
        Self::new(&key)
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<Ciphertext, EnclaveError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EnclaveError::Encryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        combined.push(TOKEN_VERSION);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&sealed);

        Ok(Ciphertext(BASE64.encode(&combined)))
    }

    fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Zeroizing<String>, EnclaveError> {
        let combined = BASE64
            .decode(ciphertext.as_str())
            .map_err(|_| EnclaveError::Decryption("token is not valid base64".to_string()))?;

        if combined.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(EnclaveError::Decryption("token too short".to_string()));
        }

        let (version, rest) = combined.split_at(1);
        if version[0] != TOKEN_VERSION {
            return Err(EnclaveError::Decryption(format!(
                "unsupported token version {}",
                version[0]
            )));
        }

        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = Zeroizing::new(self.cipher.decrypt(nonce, sealed).map_err(|_| {
            EnclaveError::Decryption("invalid key or corrupted data".to_string())
        })?);

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| EnclaveError::Decryption("plaintext is not valid UTF-8".to_string()))?;

        Ok(Zeroizing::new(text.to_owned()))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::StaticKeySource;

    fn cipher_with_key(byte: u8) -> AesGcmCipher {
        AesGcmCipher::new(&[byte; DERIVED_KEY_LEN]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher_with_key(7);
        let long = "x".repeat(4096);
        for plaintext in ["", "a", "Sw0rdFish!", "pässwörd 🔑", long.as_str()] {
            let token = cipher.encrypt(plaintext).unwrap();
            let decrypted = cipher.decrypt(&token).unwrap();
            assert_eq!(decrypted.as_str(), plaintext);
        }
    }

    #[test]
    fn test_same_plaintext_encrypts_differently() {
        let cipher = cipher_with_key(7);
        let first = cipher.encrypt("Sw0rdFish!").unwrap();
        let second = cipher.encrypt("Sw0rdFish!").unwrap();

        assert_ne!(first, second, "Fresh nonces must give distinct tokens");
        assert_eq!(cipher.decrypt(&first).unwrap().as_str(), "Sw0rdFish!");
        assert_eq!(cipher.decrypt(&second).unwrap().as_str(), "Sw0rdFish!");
    }

    #[test]
    fn test_token_does_not_contain_plaintext() {
        let cipher = cipher_with_key(7);
        let token = cipher.encrypt("hunter2hunter2").unwrap();
        assert!(!token.as_str().contains("hunter2"));
    }

    #[test]
    fn test_flipping_any_byte_fails() {
        let cipher = cipher_with_key(7);
        let token = cipher.encrypt("Sw0rdFish!").unwrap();
        let raw = BASE64.decode(token.as_str()).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let forged = Ciphertext::from_stored(BASE64.encode(&tampered));
            assert!(
                matches!(cipher.decrypt(&forged), Err(EnclaveError::Decryption(_))),
                "Flipping byte {} must be detected",
                i
            );
        }
    }

    #[test]
    fn test_flipping_any_token_character_fails() {
        let cipher = cipher_with_key(7);
        let token = cipher.encrypt("Sw0rdFish!").unwrap();
        let bytes = token.as_str().as_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[i] ^= 0x01;
            let forged = Ciphertext::from_stored(String::from_utf8(tampered).unwrap());
            assert!(
                matches!(cipher.decrypt(&forged), Err(EnclaveError::Decryption(_))),
                "Flipping character {} must be detected",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = cipher_with_key(1).encrypt("Sw0rdFish!").unwrap();
        let result = cipher_with_key(2).decrypt(&token);
        assert!(matches!(result, Err(EnclaveError::Decryption(_))));
    }

    #[test]
    fn test_malformed_tokens_fail() {
        let cipher = cipher_with_key(7);
        for garbage in ["", "not base64!!", "AAAA", "Sw0rdFish!"] {
            let forged = Ciphertext::from_stored(garbage.to_string());
            assert!(
                matches!(cipher.decrypt(&forged), Err(EnclaveError::Decryption(_))),
                "{:?} must be rejected",
                garbage
            );
        }
    }

    #[test]
    fn test_truncated_token_fails() {
        let cipher = cipher_with_key(7);
        let token = cipher.encrypt("Sw0rdFish!").unwrap();
        let mut raw = BASE64.decode(token.as_str()).unwrap();
        raw.pop();

        let forged = Ciphertext::from_stored(BASE64.encode(&raw));
        assert!(matches!(
            cipher.decrypt(&forged),
            Err(EnclaveError::Decryption(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_key_length() {
        assert!(matches!(
            AesGcmCipher::new(&[0u8; 16]),
            Err(EnclaveError::Derivation(_))
        ));
    }

    #[test]
    fn test_from_source_is_stable_across_instances() {
        let kdf = KdfParams::for_tests();
        let source = StaticKeySource::new(b"operator master secret".to_vec());

        let first = AesGcmCipher::from_source(&source, &kdf).unwrap();
        let second = AesGcmCipher::from_source(&source, &kdf).unwrap();

        let token = first.encrypt("N3wSecret#").unwrap();
        assert_eq!(second.decrypt(&token).unwrap().as_str(), "N3wSecret#");
    }

    #[test]
    fn test_from_source_propagates_missing_material() {
        let source = StaticKeySource::new(Vec::new());
        let result = AesGcmCipher::from_source(&source, &KdfParams::for_tests());
        assert!(matches!(result, Err(EnclaveError::KeyMaterialMissing(_))));
    }

    #[test]
    fn test_debug_redacts() {
        let cipher = cipher_with_key(7);
        let token = cipher.encrypt("Sw0rdFish!").unwrap();

        assert!(format!("{:?}", cipher).contains("[REDACTED]"));
        assert!(!format!("{:?}", token).contains(token.as_str()));
    }
}
