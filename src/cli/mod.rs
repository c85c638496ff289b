// Credvault: CLI Module
//
// Command-line interface using clap derive macros. Commands only translate
// arguments into vault store calls and format the results.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub use commands::execute;

use crate::config::{DB_ENV, KEY_FILE_ENV};
use crate::enclave::DEFAULT_LENGTH;

/// Credvault: a personal password vault with secrets encrypted at rest.
#[derive(Parser, Debug)]
#[command(name = "credvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to the vault database.
    #[arg(long, global = true, env = DB_ENV)]
    pub db: Option<PathBuf>,

    /// Read the master secret from this file instead of CREDVAULT_KEY.
    #[arg(long, global = true, env = KEY_FILE_ENV)]
    pub key_file: Option<PathBuf>,

    /// Use the master secret stored in the platform keyring.
    #[arg(long, global = true)]
    pub keyring: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the vault database and register the master key with it.
    /// With --keyring, a new master secret is generated in the platform keyring if none exists.
    Init,

    /// Print a random password. Does not need the vault.
    Generate {
        /// Number of characters (minimum 8).
        #[arg(long, default_value_t = DEFAULT_LENGTH)]
        length: usize,
    },

    /// Create a new user.
    CreateUser {
        /// Unique display name.
        name: String,

        /// Contact address (e.g. an email).
        contact: String,
    },

    /// List all users.
    Users {
        #[arg(long)]
        json: bool,
    },

    /// Delete a user with all of its accounts and passwords.
    DeleteUser {
        /// The user's name.
        name: String,
    },

    /// Add an account (site + login) for a user.
    AddAccount {
        /// The owning user's name.
        user: String,

        /// Site or service label (e.g. "GitHub").
        site: String,

        /// Login name at that site.
        login: String,
    },

    /// List a user's accounts.
    Accounts {
        /// The user's name.
        user: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete an account and its passwords.
    DeleteAccount {
        /// The UUID of the account.
        id: String,
    },

    /// Store a password for an account. Without --secret, one is generated and printed once.
    AddPassword {
        /// The UUID of the account.
        account_id: String,

        /// The password to store.
        /// For real use, prefer generation to keep secrets out of shell history.
        #[arg(long)]
        secret: Option<String>,

        /// Length of the generated password.
        #[arg(long, default_value_t = DEFAULT_LENGTH, conflicts_with = "secret")]
        length: usize,
    },

    /// List the passwords stored for an account (metadata only unless --reveal).
    Passwords {
        /// The UUID of the account.
        account_id: String,

        /// Decrypt and print each password.
        #[arg(long)]
        reveal: bool,

        #[arg(long, conflicts_with = "reveal")]
        json: bool,
    },

    /// Decrypt and print one password.
    ShowPassword {
        /// The UUID of the password.
        id: String,
    },

    /// Replace a stored password. Without --secret, a new one is generated and printed once.
    UpdatePassword {
        /// The UUID of the password.
        id: String,

        #[arg(long)]
        secret: Option<String>,

        #[arg(long, default_value_t = DEFAULT_LENGTH, conflicts_with = "secret")]
        length: usize,
    },

    /// Delete one password.
    DeletePassword {
        /// The UUID of the password.
        id: String,
    },

    /// Remove the master secret from the platform keyring.
    /// Every password encrypted under it becomes unrecoverable.
    ForgetKey {
        /// Required: confirms the secret should be destroyed.
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_account() {
        let cli = Cli::try_parse_from(["credvault", "add-account", "kelly", "GitHub", "kelly"]).unwrap();
        match cli.command {
            Commands::AddAccount { user, site, login } => {
                assert_eq!(user, "kelly");
                assert_eq!(site, "GitHub");
                assert_eq!(login, "kelly");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "credvault",
            "users",
            "--db",
            "/tmp/vault.db",
            "--key-file",
            "/tmp/vault.key",
        ])
        .unwrap();
        assert_eq!(cli.global.db, Some(PathBuf::from("/tmp/vault.db")));
        assert_eq!(cli.global.key_file, Some(PathBuf::from("/tmp/vault.key")));
        assert!(!cli.global.keyring);
    }

    #[test]
    fn test_secret_conflicts_with_length() {
        let result = Cli::try_parse_from([
            "credvault",
            "add-password",
            "00000000-0000-0000-0000-000000000000",
            "--secret",
            "Sw0rdFish!",
            "--length",
            "20",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_forget_key() {
        let cli = Cli::try_parse_from(["credvault", "forget-key", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::ForgetKey { yes: true }));
    }

    #[test]
    fn test_generate_default_length() {
        let cli = Cli::try_parse_from(["credvault", "generate"]).unwrap();
        assert!(matches!(cli.command, Commands::Generate { length: 16 }));
    }
}
