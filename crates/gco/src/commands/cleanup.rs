//! `gco cleanup` command implementation.
//!
//! Standalone cleanup for persistent agents and aborted builds. The
//! strategy that ran configure is reconstructed from the persisted marker;
//! scratch directories of a crashed process cannot be recovered here, the
//! next checkout converges on a clean state instead.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use gco_auth::factory;
use gco_git::GitClient;

use super::{AuthArgs, build_settings};

/// Remove credential configuration left by an earlier checkout.
#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Remote repository URL.
    #[arg(long, env = "CI_REPOSITORY_URL")]
    pub repository_url: String,

    /// Working directory of the checkout.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Hostnames fronting the same backend as the repository host.
    #[arg(long = "compatible-host", value_delimiter = ',')]
    pub compatible_hosts: Vec<String>,
}

impl CleanupArgs {
    /// Run the cleanup command.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository cannot be inspected.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = build_settings(
            &self.repository_url,
            &self.path,
            &self.auth,
            self.compatible_hosts.clone(),
            false,
            true,
        );

        let mut git = GitClient::new(&settings.repository_path)?;
        let mut strategy = factory::select_for_cleanup(&mut git, &settings).await?;
        info!("removing {} auth configuration", strategy.helper_type());
        strategy.remove_submodule_auth(&mut git).await;
        strategy.remove_auth(&mut git).await?;
        Ok(())
    }
}
