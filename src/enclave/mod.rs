// Credvault: Enclave Module
//
// Everything that touches secret material: loading the master key from the
// environment, a key file, or the platform keyring; deriving the AES-256 key
// with Argon2id; the authenticated cipher that produces stored ciphertext;
// and the random password generator.
//
// Losing the master key makes every stored ciphertext unrecoverable.

mod cipher;
mod error;
mod generator;
mod provider;

pub use cipher::{AesGcmCipher, Ciphertext, SecretCipher};
pub use error::EnclaveError;
pub use generator::{generate_password, satisfies_policy, DEFAULT_LENGTH, MAX_LENGTH, MIN_LENGTH};
pub use provider::{
    derive_cipher_key, EnvKeySource, FileKeySource, KdfParams, KeyMaterialSource,
    KeyringProvider, StaticKeySource, DEFAULT_KEY_ENV,
};
