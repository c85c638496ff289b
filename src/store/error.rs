// Credvault: Store error types

use std::fmt;

use thiserror::Error;

use crate::enclave::EnclaveError;

/// The kind of record a reference failed to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Account,
    Password,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User => write!(f, "User"),
            Entity::Account => write!(f, "Account"),
            Entity::Password => write!(f, "Password"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {reference}")]
    NotFound { entity: Entity, reference: String },

    #[error("A user named '{0}' already exists")]
    DuplicateName(String),

    #[error("Could not decrypt password: {0}")]
    Decryption(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Cipher error: {0}")]
    Cipher(EnclaveError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid vault key: stored data was encrypted with a different key")]
    InvalidKey,

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn not_found(entity: Entity, reference: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            reference: reference.to_string(),
        }
    }
}

impl From<EnclaveError> for StoreError {
    fn from(err: EnclaveError) -> Self {
        match err {
            EnclaveError::Decryption(reason) => StoreError::Decryption(reason),
            err @ EnclaveError::InvalidLength { .. } => StoreError::Validation(err.to_string()),
            other => StoreError::Cipher(other),
        }
    }
}
