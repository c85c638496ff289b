// Credvault: SQLite Database Management
//
// Opens the vault database and runs schema migrations. Secrets are encrypted
// field by field before they reach this layer, so the file itself is plain
// SQLite. Foreign keys are enforced, but none of them cascade: the store
// deletes children explicitly inside the same transaction as the parent.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::StoreError;
use crate::enclave::{Ciphertext, SecretCipher};

/// `vault_meta` key under which the key-check token is stored.
const KEY_CHECK_NAME: &str = "key_check";

/// Plaintext of the key-check token.
const KEY_CHECK_VALUE: &str = "credvault-key-check-v1";

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrapper around a SQLite connection. The connection sits behind a mutex so
/// a `Database` can be shared between threads; each store operation holds
/// the lock for its whole transaction.
///
/// The raw connection stays inside the crate, so callers can only reach the
/// tables through the vault store and its cipher:
///
/// ```compile_fail
/// let db = credvault::store::Database::open(std::path::Path::new("vault.db")).unwrap();
/// let _conn = db.conn();
/// ```
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the vault database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Lock and return the underlying connection.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Check that `cipher` holds the key this vault was initialized with.
    ///
    /// The first call stores an encrypted canary; later calls must be able to
    /// decrypt it. A mismatch means every stored password would fail to
    /// decrypt, so callers treat `InvalidKey` as fatal.
    pub fn verify_cipher(&self, cipher: &dyn SecretCipher) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT value FROM vault_meta WHERE name = ?1",
                params![KEY_CHECK_NAME],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(token) => {
                let plaintext = cipher
                    .decrypt(&Ciphertext::from_stored(token))
                    .map_err(|_| StoreError::InvalidKey)?;
                if plaintext.as_str() != KEY_CHECK_VALUE {
                    return Err(StoreError::InvalidKey);
                }
                tracing::debug!("Vault key verified");
            }
            None => {
                let token = cipher.encrypt(KEY_CHECK_VALUE)?;
                tx.execute(
                    "INSERT INTO vault_meta (name, value) VALUES (?1, ?2)",
                    params![KEY_CHECK_NAME, token.as_str()],
                )?;
                tracing::info!("Vault key registered");
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Run schema migrations to create or update tables.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                contact     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                site        TEXT NOT NULL,
                login       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS passwords (
                id          TEXT PRIMARY KEY,
                account_id  TEXT NOT NULL REFERENCES accounts(id),
                ciphertext  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vault_meta (
                name        TEXT PRIMARY KEY,
                value       TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_user
                ON accounts(user_id);

            CREATE INDEX IF NOT EXISTS idx_passwords_account
                ON passwords(account_id);

            CREATE TRIGGER IF NOT EXISTS accounts_owner_immutable
                BEFORE UPDATE OF user_id ON accounts
                WHEN NEW.user_id IS NOT OLD.user_id
            BEGIN
                SELECT RAISE(ABORT, 'account owner is immutable');
            END;

            CREATE TRIGGER IF NOT EXISTS passwords_owner_immutable
                BEFORE UPDATE OF account_id ON passwords
                WHEN NEW.account_id IS NOT OLD.account_id
            BEGIN
                SELECT RAISE(ABORT, 'password owner is immutable');
            END;
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
