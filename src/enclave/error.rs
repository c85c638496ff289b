// Credvault: Enclave error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("No key material available from {0}")]
    KeyMaterialMissing(String),

    #[error("Failed to read key material: {0}")]
    KeyMaterial(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The token is malformed, was produced under another key, or failed
    /// integrity verification.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid password length {requested}: must be between {min} and {max}")]
    InvalidLength {
        requested: usize,
        min: usize,
        max: usize,
    },
}
