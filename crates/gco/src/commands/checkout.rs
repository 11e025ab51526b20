//! `gco checkout` command implementation.
//!
//! Runs the whole credential lifecycle around the checkout: select a
//! strategy, wire it into the repository and the guarded global scope,
//! fetch, sweep submodules, and remove everything in reverse. Cleanup runs
//! even when the middle fails; credentials must never outlive the step.

use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use gco_auth::factory;
use gco_git::GitClient;

use super::{AuthArgs, build_settings};

/// Check out the repository with managed credentials.
#[derive(Debug, Args)]
pub struct CheckoutArgs {
    /// Remote repository URL.
    #[arg(long, env = "CI_REPOSITORY_URL")]
    pub repository_url: String,

    /// Working directory of the checkout.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Ref to check out after fetching; fetch-only when omitted.
    #[arg(long = "ref")]
    pub reference: Option<String>,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Hostnames fronting the same backend as the repository host.
    #[arg(long = "compatible-host", value_delimiter = ',')]
    pub compatible_hosts: Vec<String>,

    /// Write URL rewrites into the real global scope (isolated agents only).
    #[arg(long)]
    pub enable_global_instead_of: bool,

    /// Skip nested submodules during the auth sweep and update.
    #[arg(long)]
    pub no_nested_submodules: bool,

    /// Skip submodule initialization and update.
    #[arg(long)]
    pub no_submodules: bool,
}

impl CheckoutArgs {
    /// Run the checkout command.
    ///
    /// # Errors
    ///
    /// Returns an error when configuration or the fetch fails; cleanup
    /// always runs first.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = build_settings(
            &self.repository_url,
            &self.path,
            &self.auth,
            self.compatible_hosts.clone(),
            self.enable_global_instead_of,
            !self.no_nested_submodules,
        );

        let mut git = GitClient::new(&settings.repository_path)?;
        ensure_repository(&git, &settings.repository_path, &settings.repository_url).await?;

        let mut strategy = factory::select(&mut git, &settings).await?;

        // Even a half-finished configure pass must be undone; credentials
        // never outlive the step.
        let mut guard = None;
        let result = match strategy.configure_auth(&mut git).await {
            Ok(()) => match strategy.configure_global_auth(&mut git).await {
                Ok(g) => {
                    guard = Some(g);
                    self.checkout_with_auth(&mut git, &mut strategy).await
                }
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        };

        strategy.remove_submodule_auth(&mut git).await;
        if let Err(e) = strategy.remove_auth(&mut git).await {
            warn!("cleanup of repository auth failed: {e}");
        }
        if let Some(guard) = guard {
            strategy.remove_global_auth(&mut git, guard).await;
        }
        result
    }

    async fn checkout_with_auth(
        &self,
        git: &mut GitClient,
        strategy: &mut gco_auth::AuthStrategy,
    ) -> anyhow::Result<()> {
        info!("fetching {}", self.repository_url);
        git.run(&["fetch", "origin"]).await?;
        if let Some(reference) = &self.reference {
            git.run(&["checkout", reference]).await?;
        }

        if !self.no_submodules {
            strategy.configure_submodule_auth(git).await;
            let mut args = vec!["submodule", "update", "--init"];
            if !self.no_nested_submodules {
                args.push("--recursive");
            }
            if let Err(e) = git.run(&args).await {
                warn!("submodule update failed: {e}");
            }
        }
        Ok(())
    }
}

/// Initialize the working directory when no repository exists yet, and
/// keep `origin` pointed at the requested URL either way.
async fn ensure_repository(
    git: &GitClient,
    path: &std::path::Path,
    url: &str,
) -> anyhow::Result<()> {
    if path.join(".git").exists() {
        if git.run(&["remote", "get-url", "origin"]).await.is_ok() {
            git.remote_set_url("origin", url).await?;
        } else {
            git.run(&["remote", "add", "origin", url]).await?;
        }
        return Ok(());
    }
    std::fs::create_dir_all(path)?;
    git.run(&["init"]).await?;
    git.run(&["remote", "add", "origin", url]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use gco_auth::AuthError;
    use gco_auth::types::AUTH_HELPER_KEY;
    use gco_git::GitClient;

    use super::*;

    fn args(dir: &Path, username: Option<&str>, password: Option<&str>) -> CheckoutArgs {
        CheckoutArgs {
            repository_url: "https://127.0.0.1:1/a/b.git".to_string(),
            path: dir.to_path_buf(),
            reference: None,
            auth: AuthArgs {
                username: username.map(ToString::to_string),
                password: password.map(ToString::to_string),
                private_key: None,
                passphrase: None,
            },
            compatible_hosts: Vec::new(),
            enable_global_instead_of: false,
            no_nested_submodules: false,
            no_submodules: true,
        }
    }

    async fn auth_markers(dir: &Path) -> (Option<String>, Option<String>) {
        let git = GitClient::new(dir).expect("config reader");
        (
            git.try_config_get(AUTH_HELPER_KEY).await.expect("marker"),
            git.try_config_get("core.askpass").await.expect("askpass"),
        )
    }

    #[tokio::test]
    async fn test_should_leave_no_auth_config_behind_when_the_run_fails() {
        let home = tempfile::tempdir().expect("home dir");
        let repo = tempfile::tempdir().expect("repo dir");
        if GitClient::new(repo.path()).is_err() {
            return;
        }
        // Everything global-looking lands in a throwaway home.
        unsafe {
            std::env::set_var("HOME", home.path());
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        // A foreign global helper routes selection to the askpass strategy.
        std::fs::write(
            home.path().join(".gitconfig"),
            "[credential]\n\thelper = !false\n",
        )
        .expect("seed global config");

        // Missing credentials: configure fails, removal still runs.
        let err = args(repo.path(), None, None).run().await.unwrap_err();
        assert!(
            err.downcast_ref::<AuthError>()
                .is_some_and(AuthError::is_param_error)
        );
        assert_eq!(auth_markers(repo.path()).await, (None, None));

        // Credentials present: configure succeeds, the unreachable remote
        // fails the fetch, and the removal pass undoes the configuration.
        let err = args(repo.path(), Some("u"), Some("p")).run().await;
        assert!(err.is_err());
        assert_eq!(auth_markers(repo.path()).await, (None, None));
    }
}
