//! URL-embedded credential strategy for gits predating credential helpers.
//!
//! The remote URL itself carries userinfo; insteadOf rewrites point every
//! other spelling of the host at that authenticated origin.

use tracing::{debug, info};
use url::Url;

use gco_core::CoreError;
use gco_git::{ConfigScope, GitClient, ServerInfo};

use crate::errors::AuthError;
use crate::scope::{GlobalOp, GlobalScopeGuard, RewritePlan};
use crate::types::{AUTH_HELPER_KEY, AuthHelperType, INSTEAD_OF_KEY};

use super::{AuthContext, ConfigOp, origin_prefix, ssh_instead_of_key};

/// URL-embedded credential strategy.
#[derive(Debug)]
pub struct UsernamePasswordAuth {
    ctx: AuthContext,
}

impl UsernamePasswordAuth {
    pub(crate) fn new(ctx: AuthContext) -> Self {
        Self { ctx }
    }

    pub(crate) async fn configure(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        let (username, password) = self.ctx.require_basic_auth()?;
        info!(
            "embedding credentials for {username} in the origin url of {}",
            self.ctx.server.origin
        );
        let authed = authed_url(&self.ctx.settings.repository_url, username, password)?;
        git.remote_set_url("origin", authed.as_str()).await?;
        git.config_set(
            AUTH_HELPER_KEY,
            AuthHelperType::UsernamePassword.as_config_value(),
            ConfigScope::Local,
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn remove(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        git.remote_set_url("origin", &self.ctx.settings.repository_url).await?;
        git.try_config_unset(AUTH_HELPER_KEY, ConfigScope::Local).await?;
        Ok(())
    }

    pub(crate) async fn configure_global(
        &mut self,
        git: &mut GitClient,
    ) -> Result<GlobalScopeGuard, AuthError> {
        let key = self.instead_of_key()?;
        let mut plan = RewritePlan {
            write: vec![GlobalOp::UnsetAll { key: key.clone() }],
            ..RewritePlan::default()
        };
        for host in self.ctx.hosts() {
            plan.unset.push(GlobalOp::Unset {
                key: ssh_instead_of_key(&host),
            });
            plan.write.push(GlobalOp::Add {
                key: key.clone(),
                value: format!("git@{host}:"),
            });
        }
        for (protocol, host) in self.ctx.combinable() {
            plan.unset.push(GlobalOp::Unset {
                key: format!("url.{protocol}://{host}/.insteadOf"),
            });
            plan.write.push(GlobalOp::Add {
                key: key.clone(),
                value: format!("{protocol}://{host}/"),
            });
        }
        GlobalScopeGuard::enter(git, &self.ctx.settings, false, &plan).await
    }

    pub(crate) async fn configure_submodules(&mut self, git: &mut GitClient) {
        let key = match self.instead_of_key() {
            Ok(key) => key,
            Err(e) => {
                debug!("no authenticated origin for submodule sweep: {e}");
                return;
            }
        };
        // Persist the key so a later cleanup pass can find it without the
        // password.
        if let Err(e) = git.config_set(INSTEAD_OF_KEY, &key, ConfigScope::Local).await {
            debug!("could not persist insteadOf key: {e}");
        }

        let ctx = self.ctx.clone();
        self.ctx
            .sweep_submodules(git, move |sub: &ServerInfo| {
                let mut ops = vec![ConfigOp::UnsetAll { key: key.clone() }];
                for host in ctx.hosts() {
                    ops.push(ConfigOp::Add {
                        key: key.clone(),
                        value: format!("git@{host}:"),
                    });
                }
                for (protocol, host) in ctx.combinable() {
                    ops.push(ConfigOp::Add {
                        key: key.clone(),
                        value: format!("{protocol}://{host}/"),
                    });
                }
                if sub.origin != ctx.server.origin {
                    ops.push(ConfigOp::Add {
                        key: key.clone(),
                        value: origin_prefix(sub),
                    });
                }
                ops
            })
            .await;
    }

    pub(crate) async fn remove_submodules(&mut self, git: &mut GitClient) {
        let key = match git.try_config_get(INSTEAD_OF_KEY).await {
            Ok(Some(key)) => key,
            Ok(None) => match self.instead_of_key() {
                Ok(key) => key,
                Err(_) => return,
            },
            Err(e) => {
                debug!("could not read persisted insteadOf key: {e}");
                return;
            }
        };
        let section = key
            .strip_suffix(".insteadOf")
            .unwrap_or(key.as_str())
            .to_string();

        let ops = vec![
            ConfigOp::UnsetAll { key: key.clone() },
            ConfigOp::RemoveSection { section },
        ];
        self.ctx.sweep_submodules(git, move |_sub: &ServerInfo| ops.clone()).await;

        if let Err(e) = git.try_config_unset(INSTEAD_OF_KEY, ConfigScope::Local).await {
            debug!("could not unset persisted insteadOf key: {e}");
        }
    }

    fn instead_of_key(&self) -> Result<String, AuthError> {
        let (username, password) = self.ctx.require_basic_auth()?;
        let authed = authed_url(&self.ctx.settings.repository_url, username, password)?;
        let host = authed
            .host_str()
            .ok_or_else(|| AuthError::from(CoreError::param_invalid("url lost its host")))?;
        let host_port = match authed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(format!(
            "url.{}://{}:{}@{host_port}/.insteadOf",
            authed.scheme(),
            authed.username(),
            authed.password().unwrap_or("")
        ))
    }
}

/// The repository URL with userinfo embedded; the `Url` crate handles
/// percent-encoding of reserved characters.
fn authed_url(repository_url: &str, username: &str, password: &str) -> Result<Url, AuthError> {
    let mut url = Url::parse(repository_url)
        .map_err(|e| CoreError::param_invalid(format!("invalid repository url: {e}")))?;
    url.set_username(username)
        .and_then(|()| url.set_password(Some(password)))
        .map_err(|()| CoreError::param_invalid("repository url cannot carry credentials"))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use gco_core::settings::{AuthInfo, CheckoutSettings};
    use pretty_assertions::assert_eq;

    use super::*;

    fn auth(url: &str, username: &str, password: &str) -> UsernamePasswordAuth {
        let mut settings = CheckoutSettings::new(url, "/data/ws");
        settings.auth = AuthInfo::with_password(username, password);
        UsernamePasswordAuth::new(AuthContext {
            server: ServerInfo::parse(url).unwrap(),
            settings,
        })
    }

    #[test]
    fn test_should_embed_credentials_in_url() {
        let url = authed_url("https://git.example.com/a/b.git", "u", "p").unwrap();
        assert_eq!(url.as_str(), "https://u:p@git.example.com/a/b.git");
    }

    #[test]
    fn test_should_encode_reserved_characters() {
        let url = authed_url("https://git.example.com/a/b.git", "user", "p@ss/1").unwrap();
        assert_eq!(url.username(), "user");
        assert_eq!(url.password(), Some("p%40ss%2F1"));
    }

    #[test]
    fn test_should_build_authed_instead_of_key() {
        let auth = auth("https://git.example.com:8080/a/b.git", "u", "p");
        assert_eq!(
            auth.instead_of_key().unwrap(),
            "url.https://u:p@git.example.com:8080/.insteadOf"
        );
    }

    #[test]
    fn test_should_reject_ssh_url_for_embedding() {
        assert!(authed_url("git@git.example.com:a/b.git", "u", "p").is_err());
    }
}
