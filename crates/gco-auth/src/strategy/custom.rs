//! Custom credential-helper strategy, the preferred http mechanism.
//!
//! The running binary installs a copy of itself under `~/.checkout` and
//! registers it as a global credential helper once per agent. Credentials
//! go into the file store keyed by pseudo-URIs, so the helper can answer
//! `get` for any repository on the covered hosts, including downstream
//! steps of the same job.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use gco_git::{ConfigScope, GitClient, ServerInfo};

use crate::errors::AuthError;
use crate::scope::{GlobalOp, GlobalScopeGuard};
use crate::store::{self, CredentialStore};
use crate::types::{
    AUTH_HELPER_KEY, AuthHelperType, COMPATIBLE_HOST_KEY, CREDENTIAL_HELPER_KEY, HELPER_SIGNATURE,
    TASK_ID_KEY,
};

use super::{
    AuthContext, ConfigOp, http_rewrite_plan, http_submodule_configure_ops,
    http_submodule_remove_ops,
};

/// Installed-helper credential strategy.
#[derive(Debug)]
pub struct CustomCredentialAuth {
    ctx: AuthContext,
    credential_home: PathBuf,
    helper_path: PathBuf,
}

impl CustomCredentialAuth {
    pub(crate) fn new(ctx: AuthContext) -> Self {
        let credential_home = dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".checkout");
        let helper_path = credential_home.join(format!(
            "{HELPER_SIGNATURE}-{}{}",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::EXE_SUFFIX
        ));
        Self {
            ctx,
            credential_home,
            helper_path,
        }
    }

    fn helper_value(&self) -> String {
        format!("!'{}' credential", self.helper_path.display())
    }

    pub(crate) async fn configure(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        let (username, password) = self.ctx.require_basic_auth()?;
        let (username, password) = (username.to_string(), password.to_string());
        info!(
            "configuring custom credential helper for {username}@{}",
            self.ctx.server.origin
        );

        if self
            .ctx
            .settings
            .compatible_hosts
            .contains(&self.ctx.server.host_name)
        {
            git.config_set(
                COMPATIBLE_HOST_KEY,
                &self.ctx.settings.compatible_hosts.join(","),
                ConfigScope::Global,
            )
            .await?;
        }

        git.config_set(
            AUTH_HELPER_KEY,
            AuthHelperType::CustomCredential.as_config_value(),
            ConfigScope::Local,
        )
        .await?;
        self.ctx.erase_oauth2_credential(git).await;
        // Foreign local helpers would run ahead of the global registration.
        git.try_config_unset_all(CREDENTIAL_HELPER_KEY, ConfigScope::Local).await?;

        self.install_helper()?;
        self.register_global_helper(git).await?;

        let task_id = self.ctx.settings.task_id.clone();
        if !task_id.is_empty() {
            git.config_set(TASK_ID_KEY, &task_id, ConfigScope::Local).await?;
        }

        let mut credentials = CredentialStore::open_default()?;
        credentials.store(&store::shared_uri(), &username, &password);
        if !task_id.is_empty() {
            credentials.store(&store::task_uri(&task_id), &username, &password);
        }
        credentials.save()?;
        Ok(())
    }

    pub(crate) async fn remove(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        let task_id = match git.try_config_get(TASK_ID_KEY).await? {
            Some(id) => id,
            None => self.ctx.settings.task_id.clone(),
        };

        if let Ok(path) = CredentialStore::default_path()
            && path.exists()
        {
            let mut credentials = CredentialStore::open(path)?;
            if !task_id.is_empty() {
                credentials.erase(&store::task_uri(&task_id));
            }
            credentials.erase(&store::shared_uri());
            credentials.save()?;
        }

        git.try_config_unset(TASK_ID_KEY, ConfigScope::Local).await?;
        git.try_config_unset(AUTH_HELPER_KEY, ConfigScope::Local).await?;
        git.try_config_unset(COMPATIBLE_HOST_KEY, ConfigScope::Global).await?;
        Ok(())
    }

    pub(crate) async fn configure_global(
        &mut self,
        git: &mut GitClient,
    ) -> Result<GlobalScopeGuard, AuthError> {
        let mut plan = http_rewrite_plan(&self.ctx);
        // The scratch scope hides the real global registration.
        plan.extra.push(GlobalOp::Add {
            key: CREDENTIAL_HELPER_KEY.to_string(),
            value: self.helper_value(),
        });
        GlobalScopeGuard::enter(git, &self.ctx.settings, false, &plan).await
    }

    pub(crate) async fn configure_submodules(&mut self, git: &mut GitClient) {
        let helper_value = self.helper_value();
        let empty_helper_ok = git
            .is_at_least_version(gco_git::version::SUPPORT_EMPTY_CRED_HELPER)
            .await;
        let ctx = self.ctx.clone();
        self.ctx
            .sweep_submodules(git, move |sub: &ServerInfo| {
                let mut ops = http_submodule_configure_ops(&ctx, sub);
                if empty_helper_ok {
                    ops.push(ConfigOp::Add {
                        key: CREDENTIAL_HELPER_KEY.to_string(),
                        value: String::new(),
                    });
                }
                ops.push(ConfigOp::Add {
                    key: CREDENTIAL_HELPER_KEY.to_string(),
                    value: helper_value.clone(),
                });
                ops
            })
            .await;
    }

    pub(crate) async fn remove_submodules(&mut self, git: &mut GitClient) {
        let ctx = self.ctx.clone();
        self.ctx
            .sweep_submodules(git, move |_sub: &ServerInfo| {
                let mut ops = http_submodule_remove_ops(&ctx);
                ops.push(ConfigOp::UnsetAll {
                    key: CREDENTIAL_HELPER_KEY.to_string(),
                });
                ops
            })
            .await;
    }

    /// Copy the running binary into place, replacing a stale version.
    fn install_helper(&self) -> Result<(), AuthError> {
        std::fs::create_dir_all(&self.credential_home)?;
        let current = std::env::current_exe()?;
        if self.helper_path.exists() && file_digest(&current)? == file_digest(&self.helper_path)? {
            debug!("credential helper already installed at {:?}", self.helper_path);
            return Ok(());
        }
        std::fs::copy(&current, &self.helper_path)?;
        make_executable(&self.helper_path)?;
        info!("installed credential helper at {:?}", self.helper_path);
        Ok(())
    }

    /// Register the helper globally, once per agent.
    ///
    /// The registration outlives the step on purpose: downstream steps of
    /// the job resolve credentials through it.
    async fn register_global_helper(&self, git: &GitClient) -> Result<(), AuthError> {
        if !git
            .config_exists(CREDENTIAL_HELPER_KEY, HELPER_SIGNATURE, ConfigScope::Global)
            .await?
        {
            git.config_add(CREDENTIAL_HELPER_KEY, &self.helper_value(), ConfigScope::Global)
                .await?;
        }
        Ok(())
    }
}

fn file_digest(path: &Path) -> Result<String, AuthError> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use gco_core::settings::CheckoutSettings;
    use gco_git::ServerInfo;
    use pretty_assertions::assert_eq;

    use super::*;

    fn auth(url: &str) -> CustomCredentialAuth {
        CustomCredentialAuth::new(AuthContext {
            settings: CheckoutSettings::new(url, "/data/ws"),
            server: ServerInfo::parse(url).unwrap(),
        })
    }

    #[test]
    fn test_should_name_versioned_helper_binary() {
        let auth = auth("https://git.example.com/a/b.git");
        let name = auth.helper_path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("gco-credential-"));
        assert!(name.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_should_quote_helper_path_in_value() {
        let auth = auth("https://git.example.com/a/b.git");
        let value = auth.helper_value();
        assert!(value.starts_with("!'"));
        assert!(value.ends_with("' credential"));
    }

    #[test]
    fn test_should_detect_identical_files_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();
        assert_eq!(file_digest(&a).unwrap(), file_digest(&b).unwrap());

        std::fs::write(&b, b"different").unwrap();
        assert_ne!(file_digest(&a).unwrap(), file_digest(&b).unwrap());
    }
}
