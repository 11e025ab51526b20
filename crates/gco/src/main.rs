//! gco - authenticated git checkout step for CI pipelines.
//!
//! Wires pipeline-supplied credentials into git for the duration of a
//! checkout, covering the main repository, the (isolated) global scope and
//! submodules, and removes every trace afterwards.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gco_auth::AuthError;

mod commands;

mod exit_codes {
    pub const OK: i32 = 0;
    pub const ERROR: i32 = 1;
    /// Bad step input (missing credentials, unparseable URL).
    pub const PARAM: i32 = 2;
}

/// Authenticated git checkout step for CI pipelines.
#[derive(Debug, Parser)]
#[command(name = "gco", version, about = "Authenticated git checkout step for CI pipelines")]
struct Cli {
    /// Verbose diagnostics.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check out the repository with managed credentials.
    Checkout(commands::checkout::CheckoutArgs),
    /// Remove credential configuration left by an earlier checkout.
    Cleanup(commands::cleanup::CleanupArgs),
    /// Git credential helper protocol endpoint.
    #[command(hide = true)]
    Credential(commands::credential::CredentialArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; the credential subcommand owns stdout for the
    // helper protocol.
    let default_filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GCO_DEBUG")
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let exit_code = match run_command(cli.command).await {
        Ok(()) => exit_codes::OK,
        Err(e) => {
            tracing::error!("{e:#}");
            if e.downcast_ref::<AuthError>()
                .is_some_and(AuthError::is_param_error)
            {
                exit_codes::PARAM
            } else {
                exit_codes::ERROR
            }
        }
    };

    std::process::exit(exit_code);
}

async fn run_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Checkout(args) => args.run().await,
        Commands::Cleanup(args) => args.run().await,
        Commands::Credential(args) => args.run().await,
    }
}
