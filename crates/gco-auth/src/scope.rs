//! Global-scope isolation for git configuration.
//!
//! Strategies must write `url.*.insteadOf` rewrites and helper registrations
//! into "global" config without leaking them onto shared agents. The guard
//! redirects HOME at a scratch directory through the client's env overlay so
//! `git config --global` lands in a throwaway file, and tears everything
//! down when the step ends. Writing into the real global scope is allowed
//! only when the step explicitly asks for it and the agent is isolated.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use gco_core::agent;
use gco_core::settings::CheckoutSettings;
use gco_git::version::SUPPORT_XDG_CONFIG_HOME;
use gco_git::{ConfigScope, GitClient};

use crate::errors::AuthError;

/// One `git config --global` mutation, as planned by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalOp {
    /// Replace the value of a key.
    Set {
        /// Config key.
        key: String,
        /// New value.
        value: String,
    },
    /// Append to a multi-valued key.
    Add {
        /// Config key.
        key: String,
        /// Appended value.
        value: String,
    },
    /// Drop a key, tolerating absence.
    Unset {
        /// Config key.
        key: String,
    },
    /// Drop all values of a key, tolerating absence.
    UnsetAll {
        /// Config key.
        key: String,
    },
}

impl GlobalOp {
    async fn apply(&self, git: &GitClient) -> Result<(), AuthError> {
        match self {
            Self::Set { key, value } => git.config_set(key, value, ConfigScope::Global).await?,
            Self::Add { key, value } => git.config_add(key, value, ConfigScope::Global).await?,
            Self::Unset { key } => git.try_config_unset(key, ConfigScope::Global).await?,
            Self::UnsetAll { key } => git.try_config_unset_all(key, ConfigScope::Global).await?,
        }
        Ok(())
    }
}

/// The global mutations a strategy wants inside the guarded scope.
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    /// Opposite-direction leftovers to clear before writing.
    pub unset: Vec<GlobalOp>,
    /// The rewrites themselves.
    pub write: Vec<GlobalOp>,
    /// Strategy-specific keys (helper registration and the like).
    pub extra: Vec<GlobalOp>,
}

impl RewritePlan {
    async fn apply(&self, git: &GitClient) -> Result<(), AuthError> {
        for op in self.unset.iter().chain(&self.write).chain(&self.extra) {
            op.apply(git).await?;
        }
        Ok(())
    }
}

/// Live global-scope redirection.
///
/// Obtained from [`GlobalScopeGuard::enter`]; the owning command must call
/// [`GlobalScopeGuard::teardown`] when the step finishes. Teardown is not
/// tied to `Drop` because it needs async git calls.
#[derive(Debug)]
pub struct GlobalScopeGuard {
    scratch_home: PathBuf,
    xdg_base: Option<PathBuf>,
    backup: Vec<(String, String)>,
    isolated: bool,
    wrote_real_global: bool,
}

impl GlobalScopeGuard {
    /// Redirect the global scope and apply `plan` inside it.
    ///
    /// With `seed_real_config` the scratch `.gitconfig` starts as a copy of
    /// the real one, so user proxy and transport settings keep working.
    ///
    /// # Errors
    ///
    /// Fails when the scratch directory cannot be created or a planned
    /// config write fails.
    pub async fn enter(
        git: &mut GitClient,
        settings: &CheckoutSettings,
        seed_real_config: bool,
        plan: &RewritePlan,
    ) -> Result<Self, AuthError> {
        let scratch_home = tempfile::Builder::new()
            .prefix("gco-home-")
            .tempdir()?
            .keep();
        seed_gitconfig(&scratch_home, seed_real_config)?;

        let isolated = agent::is_isolated();
        let wrote_real_global = settings.enable_global_instead_of && isolated;

        let mut guard = Self {
            scratch_home,
            xdg_base: None,
            backup: Vec::new(),
            isolated,
            wrote_real_global,
        };

        if wrote_real_global {
            // Downstream steps in this job see the rewrites too.
            plan.apply(git).await?;
            git.set_env(agent::HOME, guard.scratch_home.display().to_string());
            // The step's own git resolves global config through the scratch
            // scope now; mirror the plan there so the checkout sees it.
            plan.apply(git).await?;
        } else {
            if isolated {
                guard.backup = backup_and_strip_rewrites(git).await?;
            }
            git.set_env(agent::HOME, guard.scratch_home.display().to_string());
            plan.apply(git).await?;
        }
        debug!("global scope redirected to {:?}", guard.scratch_home);

        if git.is_at_least_version(SUPPORT_XDG_CONFIG_HOME).await {
            guard.promote_to_xdg(git, &xdg_base(settings))?;
        }
        Ok(guard)
    }

    /// Scratch directory currently standing in for HOME.
    pub fn scratch_home(&self) -> &Path {
        &self.scratch_home
    }

    /// Move the scratch config under `base_dir/git/config` and switch the
    /// overlay from HOME to `XDG_CONFIG_HOME`.
    ///
    /// Credential mechanisms that resolve state under the real HOME
    /// (keychains, the installed helper's store) keep working this way,
    /// and rewrites written to the real global scope stay visible.
    fn promote_to_xdg(&mut self, git: &mut GitClient, base_dir: &Path) -> Result<(), AuthError> {
        let target = base_dir.join("git").join("config");
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(self.scratch_home.join(".gitconfig"), &target)?;

        git.remove_env(agent::HOME);
        git.set_env(agent::XDG_CONFIG_HOME, base_dir.display().to_string());
        self.xdg_base = Some(base_dir.to_path_buf());
        debug!("global scope promoted to XDG config at {target:?}");
        Ok(())
    }

    /// Undo the redirection and delete every scratch artifact.
    ///
    /// Never fails: cleanup problems are logged and swallowed so one broken
    /// teardown step cannot leave the rest in place.
    pub async fn teardown(self, git: &mut GitClient) {
        if let Some(base) = &self.xdg_base {
            git.remove_env(agent::XDG_CONFIG_HOME);
            let config = base.join("git").join("config");
            if let Err(e) = fs::remove_file(&config) {
                warn!("failed to remove promoted config {config:?}: {e}");
            }
        }

        git.remove_env(agent::HOME);
        if let Err(e) = fs::remove_dir_all(&self.scratch_home) {
            warn!("failed to remove scratch home {:?}: {e}", self.scratch_home);
        }

        if !self.wrote_real_global && self.isolated {
            for (key, value) in &self.backup {
                if let Err(e) = git.config_add(key, value, ConfigScope::Global).await {
                    warn!("failed to restore global rewrite {key}: {e}");
                }
            }
        }
    }
}

/// `~/.checkout/<pipeline>/<job>`, the per-job home for the promoted
/// config.
fn xdg_base(settings: &CheckoutSettings) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".checkout")
        .join(&settings.pipeline_id)
        .join(&settings.job_id)
}

fn seed_gitconfig(scratch_home: &Path, seed_real_config: bool) -> Result<(), AuthError> {
    let scratch_config = scratch_home.join(".gitconfig");
    let real_config = dirs::home_dir().map(|h| h.join(".gitconfig"));
    match real_config {
        Some(real) if seed_real_config && real.exists() => {
            fs::copy(&real, &scratch_config)?;
        }
        _ => {
            fs::write(&scratch_config, "")?;
        }
    }
    Ok(())
}

/// Snapshot and remove pre-existing `url.*.insteadOf` entries from the real
/// global scope so they cannot fight the scratch-scope rewrites.
async fn backup_and_strip_rewrites(
    git: &GitClient,
) -> Result<Vec<(String, String)>, AuthError> {
    let entries = git
        .try_config_get_regexp(r"^url\..*\.insteadof$", ConfigScope::Global)
        .await?;
    for (key, _) in &entries {
        git.try_config_unset_all(key, ConfigScope::Global).await?;
    }
    if !entries.is_empty() {
        debug!("backed up {} global insteadOf entries", entries.len());
    }
    Ok(entries)
}
