// Credvault: Key Material Sources
//
// The vault is constructed with exactly one master secret, supplied at
// process start from one of:
//   - an environment variable (`CREDVAULT_KEY` by default)
//   - a key file
//   - the platform keyring (created explicitly by `credvault init --keyring`)
//   - explicit bytes handed in by the caller
//
// The master secret is an opaque byte string. `derive_cipher_key()` stretches
// it with Argon2id into the 32-byte AES-256 key used by the cipher. The same
// material and parameters always yield the same key.

use std::path::PathBuf;

use argon2::{Algorithm, Argon2, Params, Version};
use keyring::credential::{CredentialBuilderApi, CredentialPersistence};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::EnclaveError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default environment variable holding the master secret.
pub const DEFAULT_KEY_ENV: &str = "CREDVAULT_KEY";

/// Service name used to identify Credvault entries in the platform keyring.
const KEYRING_SERVICE: &str = "credvault";

/// Username for the keyring entry (identifies the master secret).
const KEYRING_USER: &str = "master-secret";

/// Length of the randomly generated master secret in bytes (256-bit entropy).
const MASTER_SECRET_LEN: usize = 32;

/// Length of the derived cipher key in bytes (256-bit for AES-256).
pub(crate) const DERIVED_KEY_LEN: usize = 32;

/// Domain label mixed into the KDF salt.
const SALT_LABEL: &str = "cipher-key";

// Argon2id parameters: m=65536 (64 MiB), t=3 (3 iterations), p=4 (4 lanes)
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

// ─── Key Derivation ──────────────────────────────────────────────────────────

/// Argon2id cost parameters.
///
/// These are part of the key: material derived under different parameters
/// produces a different cipher key, so existing ciphertext would no longer
/// decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: ARGON2_M_COST,
            t_cost: ARGON2_T_COST,
            p_cost: ARGON2_P_COST,
        }
    }
}

#[cfg(test)]
impl KdfParams {
    /// Cheap parameters so tests don't spend seconds in Argon2.
    pub(crate) const fn for_tests() -> Self {
        Self {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// Build the deterministic salt for Argon2id.
/// Salt = SHA-256("credvault" || "::" || "cipher-key")
fn build_salt() -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(KEYRING_SERVICE.as_bytes());
    hasher.update(b"::");
    hasher.update(SALT_LABEL.as_bytes());
    hasher.finalize().to_vec()
}

/// Derive the 32-byte cipher key from the master secret using Argon2id.
pub fn derive_cipher_key(
    material: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
    if material.is_empty() {
        return Err(EnclaveError::Derivation(
            "master secret must not be empty".to_string(),
        ));
    }

    let salt = build_salt();

    let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(DERIVED_KEY_LEN))
        .map_err(|e| EnclaveError::Derivation(format!("invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut derived_key = Zeroizing::new(vec![0u8; DERIVED_KEY_LEN]);
    argon2
        .hash_password_into(material, &salt, &mut derived_key)
        .map_err(|e| EnclaveError::Derivation(format!("Argon2id hash failed: {}", e)))?;

    Ok(derived_key)
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A place the master secret can be loaded from.
pub trait KeyMaterialSource {
    /// Load the master secret. Absence is `KeyMaterialMissing`, which callers
    /// treat as fatal.
    fn load(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    /// Human-readable name of the source, for error messages and logs.
    fn describe(&self) -> String;
}

// ─── Environment ─────────────────────────────────────────────────────────────

/// Reads the master secret from an environment variable.
pub struct EnvKeySource {
    var: String,
}

impl EnvKeySource {
    pub fn new() -> Self {
        Self::with_var(DEFAULT_KEY_ENV)
    }

    pub fn with_var(var: &str) -> Self {
        Self {
            var: var.to_string(),
        }
    }

    /// Whether the variable is currently set to a non-empty value.
    pub fn is_present(&self) -> bool {
        std::env::var_os(&self.var).is_some_and(|v| !v.is_empty())
    }
}

impl Default for EnvKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMaterialSource for EnvKeySource {
    fn load(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let value = std::env::var_os(&self.var)
            .ok_or_else(|| EnclaveError::KeyMaterialMissing(self.describe()))?;
        let bytes = Zeroizing::new(value.into_encoded_bytes());
        if bytes.is_empty() {
            return Err(EnclaveError::KeyMaterialMissing(self.describe()));
        }

        tracing::debug!(source = %self.describe(), "Loaded master secret");
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }
}

// ─── Key File ────────────────────────────────────────────────────────────────

/// Reads the master secret from a file. Leading and trailing whitespace is
/// ignored so that a trailing newline does not change the key.
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeyMaterialSource for FileKeySource {
    fn load(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let raw = match std::fs::read(&self.path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnclaveError::KeyMaterialMissing(self.describe()));
            }
            Err(e) => {
                return Err(EnclaveError::KeyMaterial(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let trimmed = Zeroizing::new(raw.trim_ascii().to_vec());
        if trimmed.is_empty() {
            return Err(EnclaveError::KeyMaterialMissing(self.describe()));
        }

        tracing::debug!(source = %self.describe(), "Loaded master secret");
        Ok(trimmed)
    }

    fn describe(&self) -> String {
        format!("key file {}", self.path.display())
    }
}

// ─── Explicit Bytes ──────────────────────────────────────────────────────────

/// Master secret handed in directly by the caller.
pub struct StaticKeySource {
    secret: Zeroizing<Vec<u8>>,
}

impl StaticKeySource {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl KeyMaterialSource for StaticKeySource {
    fn load(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        if self.secret.is_empty() {
            return Err(EnclaveError::KeyMaterialMissing(self.describe()));
        }
        Ok(self.secret.clone())
    }

    fn describe(&self) -> String {
        "explicit key parameter".to_string()
    }
}

// ─── Platform Keyring ────────────────────────────────────────────────────────

/// Master secret kept in the platform keyring via the `keyring` crate.
/// Dispatches to:
///   - Linux: D-Bus Secret Service, with kernel keyutils as a session cache
///   - macOS: Security.framework Keychain
///   - Windows: Windows Credential Manager
///
/// The secret is only created in a store that keeps it until it is deleted.
/// A store that forgets on reboot or process exit would silently turn every
/// stored password into unrecoverable ciphertext.
pub struct KeyringProvider {
    service: String,
    user: String,
}

impl KeyringProvider {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    /// Creates a provider with custom service/user names (useful for testing isolation).
    pub fn with_names(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, EnclaveError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| EnclaveError::Keyring(format!("failed to create keyring entry: {}", e)))
    }

    /// Whether the platform keyring backend keeps secrets until they are
    /// explicitly deleted.
    pub fn backend_persists() -> bool {
        matches!(
            keyring::default::default_credential_builder().persistence(),
            CredentialPersistence::UntilDelete
        )
    }

    /// Generate a cryptographically secure random master secret.
    fn generate_master_secret() -> Zeroizing<Vec<u8>> {
        let mut secret = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
        rand::rng().fill_bytes(&mut secret);
        secret
    }

    /// Retrieve the master secret, generating and storing a new one if the
    /// keyring has none. Only `init` calls this.
    pub fn get_or_create_master_secret(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let entry = self.entry()?;

        match entry.get_secret() {
            Ok(secret) => {
                tracing::debug!("Retrieved existing master secret from keyring");
                Ok(Zeroizing::new(secret))
            }
            Err(keyring::Error::NoEntry) => {
                if !Self::backend_persists() {
                    return Err(EnclaveError::Keyring(
                        "platform keyring does not persist secrets across restarts; \
                         use a key file or CREDVAULT_KEY instead"
                            .to_string(),
                    ));
                }
                tracing::info!("No master secret found, generating a new one");
                let secret = Self::generate_master_secret();
                entry.set_secret(&secret).map_err(|e| {
                    EnclaveError::Keyring(format!("failed to store master secret: {}", e))
                })?;
                tracing::info!("Master secret stored in platform keyring");
                Ok(secret)
            }
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to retrieve master secret: {}",
                e
            ))),
        }
    }

    /// Check if a master secret already exists in the keyring.
    pub fn has_master_secret(&self) -> Result<bool, EnclaveError> {
        let entry = self.entry()?;
        match entry.get_secret() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to check master secret: {}",
                e
            ))),
        }
    }

    /// Delete the master secret from the platform keyring.
    /// WARNING: every password encrypted under it becomes unrecoverable.
    pub fn delete_master_secret(&self) -> Result<(), EnclaveError> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) => {
                tracing::warn!("Master secret deleted from keyring, stored passwords are now unrecoverable");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No master secret to delete");
                Ok(())
            }
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to delete master secret: {}",
                e
            ))),
        }
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMaterialSource for KeyringProvider {
    fn load(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        let entry = self.entry()?;
        match entry.get_secret() {
            Ok(secret) if !secret.is_empty() => {
                tracing::debug!(source = %self.describe(), "Loaded master secret");
                Ok(Zeroizing::new(secret))
            }
            Ok(_) | Err(keyring::Error::NoEntry) => {
                Err(EnclaveError::KeyMaterialMissing(self.describe()))
            }
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to retrieve master secret: {}",
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("platform keyring ({}/{})", self.service, self.user)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEST_KDF: KdfParams = KdfParams::for_tests();

    #[test]
    fn test_derivation_deterministic() {
        let material = vec![42u8; MASTER_SECRET_LEN];

        let key1 = derive_cipher_key(&material, &TEST_KDF).unwrap();
        let key2 = derive_cipher_key(&material, &TEST_KDF).unwrap();

        assert_eq!(
            key1.as_slice(),
            key2.as_slice(),
            "Same master secret must produce the same derived key"
        );
    }

    #[test]
    fn test_different_secrets_produce_different_keys() {
        let key_a = derive_cipher_key(&[1u8; MASTER_SECRET_LEN], &TEST_KDF).unwrap();
        let key_b = derive_cipher_key(&[2u8; MASTER_SECRET_LEN], &TEST_KDF).unwrap();

        assert_ne!(key_a.as_slice(), key_b.as_slice());
    }

    #[test]
    fn test_different_params_produce_different_keys() {
        let material = b"correct horse battery staple";
        let other = KdfParams {
            t_cost: 2,
            ..TEST_KDF
        };

        let key_a = derive_cipher_key(material, &TEST_KDF).unwrap();
        let key_b = derive_cipher_key(material, &other).unwrap();

        assert_ne!(key_a.as_slice(), key_b.as_slice());
    }

    #[test]
    fn test_derived_key_length() {
        let key = derive_cipher_key(&[99u8; MASTER_SECRET_LEN], &TEST_KDF).unwrap();
        assert_eq!(key.len(), DERIVED_KEY_LEN);
    }

    #[test]
    fn test_empty_material_rejected() {
        let result = derive_cipher_key(b"", &TEST_KDF);
        assert!(matches!(result, Err(EnclaveError::Derivation(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = KdfParams {
            m_cost: 1,
            t_cost: 0,
            p_cost: 1,
        };
        let result = derive_cipher_key(b"material", &bad);
        assert!(matches!(result, Err(EnclaveError::Derivation(_))));
    }

    #[test]
    fn test_default_params_match_constants() {
        let params = KdfParams::default();
        assert_eq!(params.m_cost, 65536);
        assert_eq!(params.t_cost, 3);
        assert_eq!(params.p_cost, 4);
    }

    #[test]
    fn test_env_source_reads_variable() {
        let var = "CREDVAULT_TEST_KEY_ENV_READS";
        std::env::set_var(var, "env-master-secret");

        let source = EnvKeySource::with_var(var);
        assert!(source.is_present());
        let material = source.load().unwrap();
        assert_eq!(material.as_slice(), b"env-master-secret");

        std::env::remove_var(var);
    }

    #[test]
    fn test_env_source_missing_is_fatal_error() {
        let source = EnvKeySource::with_var("CREDVAULT_TEST_KEY_ENV_NEVER_SET");
        assert!(!source.is_present());
        assert!(matches!(
            source.load(),
            Err(EnclaveError::KeyMaterialMissing(_))
        ));
    }

    #[test]
    fn test_env_source_empty_is_missing() {
        let var = "CREDVAULT_TEST_KEY_ENV_EMPTY";
        std::env::set_var(var, "");

        let source = EnvKeySource::with_var(var);
        assert!(!source.is_present());
        assert!(matches!(
            source.load(),
            Err(EnclaveError::KeyMaterialMissing(_))
        ));

        std::env::remove_var(var);
    }

    #[test]
    fn test_file_source_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "  file-master-secret  ").unwrap();

        let material = FileKeySource::new(&path).load().unwrap();
        assert_eq!(material.as_slice(), b"file-master-secret");
    }

    #[test]
    fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileKeySource::new(dir.path().join("absent.key"));

        assert!(matches!(
            source.load(),
            Err(EnclaveError::KeyMaterialMissing(_))
        ));
    }

    #[test]
    fn test_file_source_blank_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.key");
        std::fs::write(&path, "\n\n").unwrap();

        assert!(matches!(
            FileKeySource::new(&path).load(),
            Err(EnclaveError::KeyMaterialMissing(_))
        ));
    }

    #[test]
    fn test_static_source() {
        let source = StaticKeySource::new(b"explicit".to_vec());
        assert_eq!(source.load().unwrap().as_slice(), b"explicit");

        let empty = StaticKeySource::new(Vec::new());
        assert!(matches!(
            empty.load(),
            Err(EnclaveError::KeyMaterialMissing(_))
        ));
    }

    #[test]
    fn test_generated_master_secret_has_correct_entropy() {
        let secret = KeyringProvider::generate_master_secret();
        assert_eq!(secret.len(), MASTER_SECRET_LEN);
        assert_ne!(secret.as_slice(), KeyringProvider::generate_master_secret().as_slice());
    }

    #[test]
    fn test_keyring_backend_survives_restart() {
        // An in-memory backend (kernel keyutils alone) would lose the master
        // secret on reboot.
        assert!(KeyringProvider::backend_persists());
    }

    #[test]
    fn test_describe_names_the_source() {
        assert!(EnvKeySource::new().describe().contains(DEFAULT_KEY_ENV));
        assert!(FileKeySource::new("/tmp/k").describe().contains("/tmp/k"));
        assert!(KeyringProvider::with_names("svc", "usr")
            .describe()
            .contains("svc/usr"));
    }
}
