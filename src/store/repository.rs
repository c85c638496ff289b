// Credvault: Vault Store Repository
//
// Implements the User → Account → Password operations on the SQLite
// database. Every check-then-mutate sequence (duplicate names, owner
// existence, cascading deletes) runs inside a single IMMEDIATE transaction,
// so it either commits completely or not at all and two writers can never
// both pass the same existence check.
//
// Plaintext passwords cross this layer in exactly two places: they are
// encrypted on the way in (`create_password`, `update_password`) and
// decrypted on the way out (`read_password`). Listings never decrypt.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::db::Database;
use super::error::Entity;
use super::models::{Account, CascadeSummary, Password, PasswordSummary, User};
use super::StoreError;
use crate::enclave::{Ciphertext, SecretCipher};

// ─── Trait ───────────────────────────────────────────────────────────────────

/// The vault operations exposed to the command layer. Expected failures
/// (not found, duplicate name, decryption, validation) come back as
/// `StoreError` values.
pub trait VaultStore {
    /// Create a user. Fails with `DuplicateName` if the name is taken.
    fn create_user(&self, name: &str, contact: &str) -> Result<User, StoreError>;

    fn get_user(&self, id: &Uuid) -> Result<User, StoreError>;

    /// Look a user up by display name.
    fn find_user_by_name(&self, name: &str) -> Result<User, StoreError>;

    /// All users, oldest first.
    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Delete a user together with all of its accounts and their passwords.
    fn delete_user(&self, id: &Uuid) -> Result<CascadeSummary, StoreError>;

    /// Create an account under an existing user.
    fn create_account(&self, user_id: &Uuid, site: &str, login: &str)
        -> Result<Account, StoreError>;

    fn get_account(&self, id: &Uuid) -> Result<Account, StoreError>;

    /// The user's accounts, oldest first.
    fn list_accounts(&self, user_id: &Uuid) -> Result<Vec<Account>, StoreError>;

    /// Delete an account together with its passwords.
    fn delete_account(&self, id: &Uuid) -> Result<CascadeSummary, StoreError>;

    /// Encrypt `plaintext` and store it under an existing account.
    fn create_password(&self, account_id: &Uuid, plaintext: &str)
        -> Result<Password, StoreError>;

    /// The stored record, still encrypted.
    fn get_password(&self, id: &Uuid) -> Result<Password, StoreError>;

    /// Decrypt and return the secret.
    fn read_password(&self, id: &Uuid) -> Result<Zeroizing<String>, StoreError>;

    /// Replace the stored ciphertext with an encryption of `new_plaintext`.
    /// The previous ciphertext is discarded.
    fn update_password(&self, id: &Uuid, new_plaintext: &str) -> Result<(), StoreError>;

    fn delete_password(&self, id: &Uuid) -> Result<(), StoreError>;

    /// Metadata of the account's passwords, oldest first. Never decrypts.
    fn list_passwords(&self, account_id: &Uuid) -> Result<Vec<PasswordSummary>, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

pub struct SqliteVaultStore<'a> {
    db: &'a Database,
    cipher: &'a dyn SecretCipher,
}

impl<'a> SqliteVaultStore<'a> {
    pub fn new(db: &'a Database, cipher: &'a dyn SecretCipher) -> Self {
        Self { db, cipher }
    }

    /// Parse a user row: id, name, contact, created_at.
    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: parse_uuid(row, 0)?,
            name: row.get(1)?,
            contact: row.get(2)?,
            created_at: parse_timestamp(row, 3)?,
        })
    }

    /// Parse an account row: id, user_id, site, login, created_at.
    fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
        Ok(Account {
            id: parse_uuid(row, 0)?,
            user_id: parse_uuid(row, 1)?,
            site: row.get(2)?,
            login: row.get(3)?,
            created_at: parse_timestamp(row, 4)?,
        })
    }

    /// Parse a password row: id, account_id, ciphertext, created_at, updated_at.
    fn row_to_password(row: &rusqlite::Row<'_>) -> rusqlite::Result<Password> {
        let token: String = row.get(2)?;
        Ok(Password::new(
            parse_uuid(row, 0)?,
            parse_uuid(row, 1)?,
            Ciphertext::from_stored(token),
            parse_timestamp(row, 3)?,
            parse_timestamp(row, 4)?,
        ))
    }

    /// Parse a password metadata row: id, account_id, created_at, updated_at.
    fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<PasswordSummary> {
        Ok(PasswordSummary {
            id: parse_uuid(row, 0)?,
            account_id: parse_uuid(row, 1)?,
            created_at: parse_timestamp(row, 2)?,
            updated_at: parse_timestamp(row, 3)?,
        })
    }
}

impl<'a> VaultStore for SqliteVaultStore<'a> {
    fn create_user(&self, name: &str, contact: &str) -> Result<User, StoreError> {
        let name = required("name", name)?;
        let contact = required("contact", contact)?;

        let user = User {
            id: Uuid::new_v4(),
            name,
            contact,
            created_at: now(),
        };

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        let taken: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE name = ?1",
                params![user.name],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::DuplicateName(user.name));
        }

        tx.execute(
            "INSERT INTO users (id, name, contact, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id.to_string(),
                user.name,
                user.contact,
                format_timestamp(&user.created_at),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateName(user.name.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        tx.commit()?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    fn get_user(&self, id: &Uuid) -> Result<User, StoreError> {
        let conn = self.db.conn()?;
        conn.query_row(
            "SELECT id, name, contact, created_at FROM users WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_user,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::User, id))
    }

    fn find_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        let name = name.trim();
        let conn = self.db.conn()?;
        conn.query_row(
            "SELECT id, name, contact, created_at FROM users WHERE name = ?1",
            params![name],
            Self::row_to_user,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::User, name))
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, contact, created_at
             FROM users ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map([], Self::row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }

        Ok(users)
    }

    fn delete_user(&self, id: &Uuid) -> Result<CascadeSummary, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if !exists(&tx, "SELECT 1 FROM users WHERE id = ?1", id)? {
            return Err(StoreError::not_found(Entity::User, id));
        }

        let passwords = tx.execute(
            "DELETE FROM passwords
             WHERE account_id IN (SELECT id FROM accounts WHERE user_id = ?1)",
            params![id.to_string()],
        )?;
        let accounts = tx.execute(
            "DELETE FROM accounts WHERE user_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;

        tx.commit()?;

        tracing::info!(
            user_id = %id,
            accounts,
            passwords,
            "User deleted"
        );
        Ok(CascadeSummary {
            accounts,
            passwords,
        })
    }

    fn create_account(
        &self,
        user_id: &Uuid,
        site: &str,
        login: &str,
    ) -> Result<Account, StoreError> {
        let site = required("site", site)?;
        let login = required("login", login)?;

        let account = Account {
            id: Uuid::new_v4(),
            user_id: *user_id,
            site,
            login,
            created_at: now(),
        };

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if !exists(&tx, "SELECT 1 FROM users WHERE id = ?1", user_id)? {
            return Err(StoreError::not_found(Entity::User, user_id));
        }

        tx.execute(
            "INSERT INTO accounts (id, user_id, site, login, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account.id.to_string(),
                account.user_id.to_string(),
                account.site,
                account.login,
                format_timestamp(&account.created_at),
            ],
        )?;

        tx.commit()?;

        tracing::info!(
            account_id = %account.id,
            user_id = %account.user_id,
            "Account created"
        );
        Ok(account)
    }

    fn get_account(&self, id: &Uuid) -> Result<Account, StoreError> {
        let conn = self.db.conn()?;
        conn.query_row(
            "SELECT id, user_id, site, login, created_at FROM accounts WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_account,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::Account, id))
    }

    fn list_accounts(&self, user_id: &Uuid) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;

        if !exists(&tx, "SELECT 1 FROM users WHERE id = ?1", user_id)? {
            return Err(StoreError::not_found(Entity::User, user_id));
        }

        let accounts = {
            let mut stmt = tx.prepare(
                "SELECT id, user_id, site, login, created_at
                 FROM accounts WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![user_id.to_string()], Self::row_to_account)?;

            let mut accounts = Vec::new();
            for row in rows {
                accounts.push(row?);
            }
            accounts
        };

        tx.commit()?;
        Ok(accounts)
    }

    fn delete_account(&self, id: &Uuid) -> Result<CascadeSummary, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if !exists(&tx, "SELECT 1 FROM accounts WHERE id = ?1", id)? {
            return Err(StoreError::not_found(Entity::Account, id));
        }

        let passwords = tx.execute(
            "DELETE FROM passwords WHERE account_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute("DELETE FROM accounts WHERE id = ?1", params![id.to_string()])?;

        tx.commit()?;

        tracing::info!(account_id = %id, passwords, "Account deleted");
        Ok(CascadeSummary {
            accounts: 0,
            passwords,
        })
    }

    fn create_password(
        &self,
        account_id: &Uuid,
        plaintext: &str,
    ) -> Result<Password, StoreError> {
        if plaintext.is_empty() {
            return Err(StoreError::Validation(
                "password must not be empty".to_string(),
            ));
        }

        let ciphertext = self.cipher.encrypt(plaintext)?;
        let created_at = now();
        let password =
            Password::new(Uuid::new_v4(), *account_id, ciphertext, created_at, created_at);

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if !exists(&tx, "SELECT 1 FROM accounts WHERE id = ?1", account_id)? {
            return Err(StoreError::not_found(Entity::Account, account_id));
        }

        tx.execute(
            "INSERT INTO passwords (id, account_id, ciphertext, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                password.id.to_string(),
                password.account_id.to_string(),
                password.ciphertext().as_str(),
                format_timestamp(&password.created_at),
                format_timestamp(&password.updated_at),
            ],
        )?;

        tx.commit()?;

        tracing::info!(
            password_id = %password.id,
            account_id = %password.account_id,
            "Password stored"
        );
        Ok(password)
    }

    fn get_password(&self, id: &Uuid) -> Result<Password, StoreError> {
        let conn = self.db.conn()?;
        conn.query_row(
            "SELECT id, account_id, ciphertext, created_at, updated_at
             FROM passwords WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_password,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::Password, id))
    }

    fn read_password(&self, id: &Uuid) -> Result<Zeroizing<String>, StoreError> {
        let password = self.get_password(id)?;
        let plaintext = self.cipher.decrypt(password.ciphertext())?;

        tracing::debug!(password_id = %id, "Password decrypted");
        Ok(plaintext)
    }

    fn update_password(&self, id: &Uuid, new_plaintext: &str) -> Result<(), StoreError> {
        if new_plaintext.is_empty() {
            return Err(StoreError::Validation(
                "password must not be empty".to_string(),
            ));
        }

        let ciphertext = self.cipher.encrypt(new_plaintext)?;

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        let affected = tx.execute(
            "UPDATE passwords SET ciphertext = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                ciphertext.as_str(),
                format_timestamp(&now()),
                id.to_string(),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::not_found(Entity::Password, id));
        }

        tx.commit()?;

        tracing::info!(password_id = %id, "Password updated");
        Ok(())
    }

    fn delete_password(&self, id: &Uuid) -> Result<(), StoreError> {
        let conn = self.db.conn()?;
        let affected = conn.execute(
            "DELETE FROM passwords WHERE id = ?1",
            params![id.to_string()],
        )?;

        if affected == 0 {
            return Err(StoreError::not_found(Entity::Password, id));
        }

        tracing::info!(password_id = %id, "Password deleted");
        Ok(())
    }

    fn list_passwords(&self, account_id: &Uuid) -> Result<Vec<PasswordSummary>, StoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;

        if !exists(&tx, "SELECT 1 FROM accounts WHERE id = ?1", account_id)? {
            return Err(StoreError::not_found(Entity::Account, account_id));
        }

        let summaries = {
            let mut stmt = tx.prepare(
                "SELECT id, account_id, created_at, updated_at
                 FROM passwords WHERE account_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![account_id.to_string()], Self::row_to_summary)?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            summaries
        };

        tx.commit()?;
        Ok(summaries)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Start a write transaction that takes the database lock up front.
fn begin(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Run a `SELECT 1 ... WHERE id = ?1` probe.
fn exists(conn: &Connection, sql: &str, id: &Uuid) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(sql, params![id.to_string()], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Trim a required text field, rejecting blanks.
fn required(field: &str, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that text order matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
