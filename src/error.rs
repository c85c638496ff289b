// Credvault: Top-level error types
//
// Aggregates errors from the enclave and store modules into a single
// error enum for the application boundary.

use thiserror::Error;

/// Top-level error type for all Credvault operations.
#[derive(Debug, Error)]
pub enum CredvaultError {
    #[error("Enclave error: {0}")]
    Enclave(#[from] crate::enclave::EnclaveError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CredvaultError {
    /// Conditions that stop the command sequence: no key material, a key
    /// that does not match the vault, or a broken database.
    pub fn is_fatal(&self) -> bool {
        use crate::enclave::EnclaveError;
        use crate::store::StoreError;

        match self {
            CredvaultError::Enclave(
                EnclaveError::KeyMaterialMissing(_)
                | EnclaveError::KeyMaterial(_)
                | EnclaveError::Keyring(_)
                | EnclaveError::Derivation(_),
            ) => true,
            CredvaultError::Store(
                StoreError::InvalidKey | StoreError::Database(_) | StoreError::LockPoisoned,
            ) => true,
            CredvaultError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CredvaultError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::EnclaveError;
    use crate::store::{Entity, StoreError};

    #[test]
    fn test_missing_key_is_fatal() {
        let err: CredvaultError =
            EnclaveError::KeyMaterialMissing("environment variable CREDVAULT_KEY".into()).into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("CREDVAULT_KEY"));
    }

    #[test]
    fn test_expected_conditions_are_recoverable() {
        let cases: Vec<CredvaultError> = vec![
            StoreError::not_found(Entity::User, "kelly").into(),
            StoreError::DuplicateName("kelly".into()).into(),
            StoreError::Decryption("tampered".into()).into(),
            StoreError::Validation("name must not be empty".into()).into(),
            EnclaveError::InvalidLength {
                requested: 4,
                min: 8,
                max: 1024,
            }
            .into(),
        ];
        for err in cases {
            assert!(!err.is_fatal(), "{} should be recoverable", err);
        }
    }

    #[test]
    fn test_cipher_decryption_maps_to_store_decryption() {
        let err: StoreError = EnclaveError::Decryption("bad tag".into()).into();
        assert!(matches!(err, StoreError::Decryption(_)));

        let err: StoreError = EnclaveError::Encryption("oops".into()).into();
        assert!(matches!(err, StoreError::Cipher(_)));
    }

    #[test]
    fn test_short_password_length_is_validation() {
        let err: StoreError = EnclaveError::InvalidLength {
            requested: 4,
            min: 8,
            max: 1024,
        }
        .into();
        assert!(matches!(err, StoreError::Validation(ref msg) if msg.contains("between 8 and 1024")));

        let err: CredvaultError = err.into();
        assert!(!err.is_fatal());
    }
}
