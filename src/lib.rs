// Credvault: Library root
//
// Re-exports the enclave, store, config and CLI modules.

pub mod cli;
pub mod config;
pub mod enclave;
pub mod error;
pub mod store;

pub use error::{CredvaultError, Result};
