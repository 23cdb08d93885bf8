//! Flare CLI binary.

use anyhow::Result;
use flare::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the flare CLI.
///
/// Uses tokio's current_thread runtime; every command is a short sequence of
/// file and directory I/O.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Controlled via RUST_LOG, e.g. RUST_LOG=flare=debug
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flare=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting flare CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Flare CLI completed successfully");
    Ok(())
}
