// Credvault: CLI Command Handlers
//
// Each function handles one CLI subcommand. They coordinate between the
// enclave (master key, cipher, generator) and the store (users, accounts,
// passwords). Users are addressed by name; accounts and passwords by UUID.

use std::path::Path;

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{KeySource, VaultConfig};
use crate::enclave::{generate_password, AesGcmCipher, KeyringProvider, DEFAULT_KEY_ENV};
use crate::error::{CredvaultError, Result};
use crate::store::{Database, PasswordSummary, SqliteVaultStore, StoreError, VaultStore};

use super::{Cli, Commands};

/// Execute the parsed CLI command.
pub fn execute(cli: Cli) -> Result<()> {
    let global = cli.global;
    dispatch(cli.command, move || {
        let key_source = KeySource::resolve(global.key_file, DEFAULT_KEY_ENV, global.keyring)?;
        Ok(VaultConfig::new(global.db, key_source))
    })
}

/// Route a command to its handler. The vault configuration is only resolved
/// for commands that open the vault, so `generate` and `forget-key` work
/// without any key material.
fn dispatch(command: Commands, config: impl FnOnce() -> Result<VaultConfig>) -> Result<()> {
    match command {
        Commands::Generate { length } => cmd_generate(length),
        Commands::ForgetKey { yes } => cmd_forget_key(yes),
        Commands::Init => cmd_init(&config()?),
        Commands::CreateUser { name, contact } => cmd_create_user(&config()?, &name, &contact),
        Commands::Users { json } => cmd_users(&config()?, json),
        Commands::DeleteUser { name } => cmd_delete_user(&config()?, &name),
        Commands::AddAccount { user, site, login } => {
            cmd_add_account(&config()?, &user, &site, &login)
        }
        Commands::Accounts { user, json } => cmd_accounts(&config()?, &user, json),
        Commands::DeleteAccount { id } => cmd_delete_account(&config()?, &id),
        Commands::AddPassword {
            account_id,
            secret,
            length,
        } => cmd_add_password(&config()?, &account_id, secret, length),
        Commands::Passwords {
            account_id,
            reveal,
            json,
        } => cmd_passwords(&config()?, &account_id, reveal, json),
        Commands::ShowPassword { id } => cmd_show_password(&config()?, &id),
        Commands::UpdatePassword { id, secret, length } => {
            cmd_update_password(&config()?, &id, secret, length)
        }
        Commands::DeletePassword { id } => cmd_delete_password(&config()?, &id),
    }
}

// ─── Init / Generate ─────────────────────────────────────────────────────────

fn cmd_init(config: &VaultConfig) -> Result<()> {
    let mut created_secret = false;
    if config.key_source == KeySource::Keyring {
        let provider = KeyringProvider::new();
        created_secret = !provider.has_master_secret()?;
        provider.get_or_create_master_secret()?;
    }

    if let Some(dir) = config.db_path().parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let (_db, _cipher) = open_vault(config, true)?;

    println!("✓ Credvault initialized");
    println!("  Database: {}", config.db_path().display());
    println!("  Key:      {}", config.key_source.provider().describe());
    if created_secret {
        println!("  A new master secret was generated and stored in the platform keyring");
    }
    println!();
    println!("Next: create a user with `credvault create-user <name> <contact>`");

    Ok(())
}

fn cmd_generate(length: usize) -> Result<()> {
    let password = generate_password(length)?;
    println!("{}", password.as_str());
    Ok(())
}

fn cmd_forget_key(confirmed: bool) -> Result<()> {
    if !confirmed {
        return Err(CredvaultError::Other(
            "Refusing to delete the master secret without --yes. \
             Every stored password would become unrecoverable."
                .to_string(),
        ));
    }

    let provider = KeyringProvider::new();
    if !provider.has_master_secret()? {
        println!("No master secret in the platform keyring.");
        return Ok(());
    }

    provider.delete_master_secret()?;
    println!("✓ Master secret removed from the platform keyring");

    Ok(())
}

// ─── Users ───────────────────────────────────────────────────────────────────

fn cmd_create_user(config: &VaultConfig, name: &str, contact: &str) -> Result<()> {
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let user = store.create_user(name, contact)?;
    println!("✓ User created");
    println!("  ID:      {}", user.id);
    println!("  Name:    {}", user.name);
    println!("  Contact: {}", user.contact);

    Ok(())
}

fn cmd_users(config: &VaultConfig, json: bool) -> Result<()> {
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let users = store.list_users()?;

    if json {
        return print_json(&users);
    }

    if users.is_empty() {
        println!("No users yet.");
        println!("Create one with: credvault create-user <name> <contact>");
        return Ok(());
    }

    println!("Users ({}):\n", users.len());
    for user in &users {
        println!(
            "  {} │ {:16} │ {}",
            user.id, user.name, user.contact
        );
    }

    Ok(())
}

fn cmd_delete_user(config: &VaultConfig, name: &str) -> Result<()> {
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let user = store.find_user_by_name(name)?;
    let removed = store.delete_user(&user.id)?;
    println!(
        "✓ User {} deleted ({} accounts, {} passwords removed)",
        user.name, removed.accounts, removed.passwords
    );

    Ok(())
}

// ─── Accounts ────────────────────────────────────────────────────────────────

fn cmd_add_account(config: &VaultConfig, user: &str, site: &str, login: &str) -> Result<()> {
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let owner = store.find_user_by_name(user)?;
    let account = store.create_account(&owner.id, site, login)?;
    println!("✓ Account created");
    println!("  ID:    {}", account.id);
    println!("  Site:  {}", account.site);
    println!("  Login: {}", account.login);

    Ok(())
}

fn cmd_accounts(config: &VaultConfig, user: &str, json: bool) -> Result<()> {
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let owner = store.find_user_by_name(user)?;
    let accounts = store.list_accounts(&owner.id)?;

    if json {
        return print_json(&accounts);
    }

    if accounts.is_empty() {
        println!("{} has no accounts.", owner.name);
        return Ok(());
    }

    println!("Accounts for {} ({}):\n", owner.name, accounts.len());
    for account in &accounts {
        println!("  {} │ {:20} │ {}", account.id, account.site, account.login);
    }

    Ok(())
}

fn cmd_delete_account(config: &VaultConfig, id: &str) -> Result<()> {
    let id = parse_id("account", id)?;
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let removed = store.delete_account(&id)?;
    println!(
        "✓ Account {} deleted ({} passwords removed)",
        id, removed.passwords
    );

    Ok(())
}

// ─── Passwords ───────────────────────────────────────────────────────────────

fn cmd_add_password(
    config: &VaultConfig,
    account_id: &str,
    secret: Option<String>,
    length: usize,
) -> Result<()> {
    let account_id = parse_id("account", account_id)?;
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let (plaintext, generated) = secret_or_generated(secret, length)?;
    let password = store.create_password(&account_id, &plaintext)?;

    println!("✓ Password stored");
    println!("  ID:      {}", password.id);
    println!("  Account: {}", password.account_id);
    if generated {
        println!("  Secret:  {}", plaintext.as_str());
        println!();
        println!("This is the only time the generated password is printed without --reveal.");
    }

    Ok(())
}

fn cmd_passwords(config: &VaultConfig, account_id: &str, reveal: bool, json: bool) -> Result<()> {
    let account_id = parse_id("account", account_id)?;
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let summaries = store.list_passwords(&account_id)?;

    if json {
        return print_json(&summaries);
    }

    if summaries.is_empty() {
        println!("No passwords stored for account {}.", account_id);
        return Ok(());
    }

    // Decrypt everything before printing so a failure cannot leave a
    // half-printed listing.
    let secrets = if reveal {
        reveal_secrets(&store, &summaries)?
    } else {
        Vec::new()
    };

    println!("Passwords for account {} ({}):\n", account_id, summaries.len());
    for (i, summary) in summaries.iter().enumerate() {
        let updated = summary.updated_at.format("%Y-%m-%d %H:%M:%S UTC");
        let shown = match secrets.get(i) {
            Some(Some(plaintext)) => plaintext.as_str(),
            Some(None) => "[UNREADABLE]",
            None => "[REDACTED]",
        };
        println!("  {} │ {} │ {}", summary.id, updated, shown);
    }

    Ok(())
}

fn cmd_show_password(config: &VaultConfig, id: &str) -> Result<()> {
    let id = parse_id("password", id)?;
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let plaintext = store.read_password(&id)?;
    println!("{}", plaintext.as_str());

    Ok(())
}

fn cmd_update_password(
    config: &VaultConfig,
    id: &str,
    secret: Option<String>,
    length: usize,
) -> Result<()> {
    let id = parse_id("password", id)?;
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    let (plaintext, generated) = secret_or_generated(secret, length)?;
    store.update_password(&id, &plaintext)?;

    println!("✓ Password {} updated", id);
    if generated {
        println!("  Secret: {}", plaintext.as_str());
    }

    Ok(())
}

fn cmd_delete_password(config: &VaultConfig, id: &str) -> Result<()> {
    let id = parse_id("password", id)?;
    let (db, cipher) = open_vault(config, false)?;
    let store = SqliteVaultStore::new(&db, &cipher);

    store.delete_password(&id)?;
    println!("✓ Password {} deleted", id);

    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Load the key, open the database and check the key against it.
///
/// Outside of `init` the database must already exist, so a mistyped `--db`
/// does not silently create an empty vault.
fn open_vault(config: &VaultConfig, create: bool) -> Result<(Database, AesGcmCipher)> {
    let path = config.db_path();
    if !create && !path.exists() {
        return Err(CredvaultError::Other(format!(
            "Vault not found at {}. Run `credvault init` first.",
            path.display()
        )));
    }

    let cipher = config.open_cipher()?;
    let db = open_database(path)?;
    db.verify_cipher(&cipher)?;

    Ok((db, cipher))
}

fn open_database(path: &Path) -> Result<Database> {
    let db = Database::open(path)?;
    tracing::debug!(path = %path.display(), "Vault database opened");
    Ok(db)
}

/// Decrypt each listed password. A record that fails to decrypt yields
/// `None`; any other store failure aborts the whole listing.
fn reveal_secrets(
    store: &impl VaultStore,
    summaries: &[PasswordSummary],
) -> Result<Vec<Option<Zeroizing<String>>>> {
    summaries
        .iter()
        .map(|summary| match store.read_password(&summary.id) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(StoreError::Decryption(_)) => {
                tracing::warn!(password_id = %summary.id, "Password could not be decrypted");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        })
        .collect()
}

fn parse_id(kind: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|e| CredvaultError::Other(format!("Invalid {} UUID '{}': {}", kind, value, e)))
}

/// Use the given secret, or generate one. The flag reports which happened.
fn secret_or_generated(
    secret: Option<String>,
    length: usize,
) -> Result<(Zeroizing<String>, bool)> {
    match secret {
        Some(secret) => Ok((Zeroizing::new(secret), false)),
        None => Ok((generate_password(length)?, true)),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| CredvaultError::Other(format!("Failed to encode JSON: {}", e)))?;
    println!("{}", out);
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
