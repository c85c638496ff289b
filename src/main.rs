// Credvault: Application Entry Point
//
// Parses CLI arguments, initializes structured logging (with a filter that
// never emits secret values), and dispatches to the command handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use credvault::cli::{execute, Cli};

fn main() {
    // RUST_LOG=credvault=debug for verbose output. Logs go to stderr so
    // stdout carries only command output (JSON listings, generated passwords).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("credvault=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        // Key and storage failures get a distinct status so scripts can stop.
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}
