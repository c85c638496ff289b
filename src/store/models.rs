// Credvault: Vault data models
//
// User → Account → Password. Each record holds a plain "belongs-to"
// identifier for its owner; ownership itself is enforced by the store.
//
// SECURITY: `Password` carries only ciphertext, and even that stays out of
// Debug output and serialized listings. Plaintext is never a field of any
// record; it exists only as the return value of `read_password`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enclave::Ciphertext;

/// A vault owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Unique across all users.
    pub name: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} <{}>", self.id, self.name, self.contact)
    }
}

/// A login at some site, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub site: String,
    pub login: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.site, self.login)
    }
}

/// A stored secret, owned by exactly one account.
/// The payload is always the output of the vault cipher.
#[derive(Clone)]
pub struct Password {
    pub id: Uuid,
    pub account_id: Uuid,
    ciphertext: Ciphertext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Password {
    pub(crate) fn new(
        id: Uuid,
        account_id: Uuid,
        ciphertext: Ciphertext,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            ciphertext,
            created_at,
            updated_at,
        }
    }

    /// The encrypted payload as stored.
    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }

    /// Metadata view of this record.
    pub fn summary(&self) -> PasswordSummary {
        PasswordSummary {
            id: self.id,
            account_id: self.account_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("ciphertext", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Password metadata, used for listing. Never contains secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSummary {
    pub id: Uuid,
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for PasswordSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] created {}",
            self.id,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Child records removed along with a deleted user or account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub accounts: usize,
    pub passwords: usize,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_password() -> Password {
        Password::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Ciphertext::from_stored("AQIDBAUGBwgJCgsMDQ4PEA==".to_string()),
            Utc::now(),
            Utc::now(),
        )
    }

    #[test]
    fn test_password_debug_redacts_ciphertext() {
        let password = sample_password();
        let debug_output = format!("{:?}", password);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("AQIDBAUGBwgJCgsMDQ4PEA=="));
    }

    #[test]
    fn test_password_summary_has_no_secret_field() {
        let summary = sample_password().summary();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("cipher"));
        assert!(!json.contains("AQIDBAUGBwgJCgsMDQ4PEA=="));
    }

    #[test]
    fn test_summary_copies_metadata() {
        let password = sample_password();
        let summary = password.summary();
        assert_eq!(summary.id, password.id);
        assert_eq!(summary.account_id, password.account_id);
        assert_eq!(summary.created_at, password.created_at);
    }

    #[test]
    fn test_user_display() {
        let user = User {
            id: Uuid::new_v4(),
            name: "kelly".to_string(),
            contact: "kelly@example.com".to_string(),
            created_at: Utc::now(),
        };
        let display = user.to_string();
        assert!(display.contains("kelly <kelly@example.com>"));
    }

    #[test]
    fn test_account_display() {
        let account = Account {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            site: "GitHub".to_string(),
            login: "kelly".to_string(),
            created_at: Utc::now(),
        };
        assert!(account.to_string().contains("GitHub (kelly)"));
    }
}
