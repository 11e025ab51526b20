//! Subcommands of the checkout step.

pub mod checkout;
pub mod cleanup;
pub mod credential;

use std::path::Path;

use gco_core::agent;
use gco_core::settings::{AuthInfo, CheckoutSettings};

/// Credential flags shared by checkout and cleanup.
#[derive(Debug, clap::Args)]
pub struct AuthArgs {
    /// Username for http basic auth (or a token username such as oauth2).
    #[arg(long, env = "CI_REPOSITORY_USERNAME")]
    pub username: Option<String>,
    /// Password or access token for http basic auth.
    #[arg(long, env = "CI_REPOSITORY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// SSH private key for ssh remotes.
    #[arg(long, env = "CI_REPOSITORY_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    /// Passphrase protecting the private key.
    #[arg(long, env = "CI_REPOSITORY_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

impl AuthArgs {
    fn auth_info(&self) -> AuthInfo {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            AuthInfo::with_password(username, password)
        } else if let Some(key) = &self.private_key {
            AuthInfo::with_private_key(key, self.passphrase.clone())
        } else {
            AuthInfo::default()
        }
    }
}

/// Build step settings from CLI inputs and the agent environment.
fn build_settings(
    repository_url: &str,
    path: &Path,
    auth: &AuthArgs,
    compatible_hosts: Vec<String>,
    enable_global_instead_of: bool,
    nested_submodules: bool,
) -> CheckoutSettings {
    let mut settings = CheckoutSettings::new(repository_url, path);
    settings.auth = auth.auth_info();
    settings.compatible_hosts = compatible_hosts;
    settings.enable_global_instead_of = enable_global_instead_of;
    settings.nested_submodules = nested_submodules;
    settings.pipeline_id = std::env::var(agent::CI_PIPELINE_ID).unwrap_or_default();
    settings.job_id = std::env::var(agent::CI_BUILD_JOB_ID).unwrap_or_default();
    settings.task_id = std::env::var(agent::CI_BUILD_TASK_ID).unwrap_or_default();
    settings
}
