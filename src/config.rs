// Credvault: Runtime configuration
//
// Where the database lives and where the master secret comes from. Values
// arrive from command-line flags and environment variables; there is no
// config file, so key material can never end up in a checked-in file.

use std::path::{Path, PathBuf};

use crate::enclave::{
    AesGcmCipher, EnclaveError, EnvKeySource, FileKeySource, KdfParams, KeyMaterialSource,
    KeyringProvider,
};

/// Environment variable overriding the database path.
pub const DB_ENV: &str = "CREDVAULT_DB";

/// Environment variable naming a key file.
pub const KEY_FILE_ENV: &str = "CREDVAULT_KEY_FILE";

/// Where the master secret is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    Env(String),
    Keyring,
}

impl KeySource {
    /// Pick a source. A key file wins over the environment variable, which
    /// wins over the keyring; the keyring is only consulted when requested.
    pub fn resolve(
        key_file: Option<PathBuf>,
        key_env: &str,
        use_keyring: bool,
    ) -> Result<Self, EnclaveError> {
        if let Some(path) = key_file {
            return Ok(KeySource::File(path));
        }
        if EnvKeySource::with_var(key_env).is_present() {
            return Ok(KeySource::Env(key_env.to_string()));
        }
        if use_keyring {
            return Ok(KeySource::Keyring);
        }
        Err(EnclaveError::KeyMaterialMissing(format!(
            "any source: set {}, pass --key-file, or use --keyring",
            key_env
        )))
    }

    pub fn provider(&self) -> Box<dyn KeyMaterialSource> {
        match self {
            KeySource::File(path) => Box::new(FileKeySource::new(path)),
            KeySource::Env(var) => Box::new(EnvKeySource::with_var(var)),
            KeySource::Keyring => Box::new(KeyringProvider::new()),
        }
    }
}

/// Everything needed to open a vault.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub db_path: PathBuf,
    pub key_source: KeySource,
    pub kdf: KdfParams,
}

impl VaultConfig {
    pub fn new(db_path: Option<PathBuf>, key_source: KeySource) -> Self {
        Self {
            db_path: db_path.unwrap_or_else(Self::default_db_path),
            key_source,
            kdf: KdfParams::default(),
        }
    }

    /// `<data dir>/credvault/credvault.db`
    pub fn default_db_path() -> PathBuf {
        let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("credvault").join("credvault.db")
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Load the master secret and build the cipher. Missing key material is
    /// returned as `KeyMaterialMissing`, which the binary treats as fatal.
    pub fn open_cipher(&self) -> Result<AesGcmCipher, EnclaveError> {
        let provider = self.key_source.provider();
        AesGcmCipher::from_source(provider.as_ref(), &self.kdf)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
