// Credvault: Store Module
//
// The credential data model (User → Account → Password) on SQLite. Passwords
// are encrypted by the enclave cipher before they are written; ownership and
// cascade deletion are enforced here rather than by the database engine.

mod db;
mod error;
mod models;
mod repository;

pub use db::Database;
pub use error::{Entity, StoreError};
pub use models::{Account, CascadeSummary, Password, PasswordSummary, User};
pub use repository::{SqliteVaultStore, VaultStore};
