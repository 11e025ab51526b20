//! The five credential strategies and their shared plumbing.
//!
//! Every strategy implements the same four-phase protocol: configure the
//! main repository, enter the guarded global scope, sweep submodules, and
//! undo all of it in reverse. Dispatch is a plain enum; the set of
//! mechanisms is closed and the selector names them explicitly.

mod ask_pass;
mod custom;
mod ssh;
mod store_credential;
mod username_password;

use std::collections::BTreeSet;
use std::path::Path;

use secrecy::ExposeSecret;
use tracing::debug;

use gco_core::settings::CheckoutSettings;
use gco_git::submodule::list_submodules;
use gco_git::{CredentialAction, GitClient, ServerInfo};

pub use ask_pass::AskPassAuth;
pub use custom::CustomCredentialAuth;
pub use ssh::SshAuth;
pub use store_credential::StoreCredentialAuth;
pub use username_password::UsernamePasswordAuth;

use crate::errors::AuthError;
use crate::host_set;
use crate::scope::{GlobalOp, GlobalScopeGuard, RewritePlan};
use crate::types::AuthHelperType;
use crate::wire::CredentialRecord;

/// Shared state every strategy carries.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The step settings.
    pub settings: CheckoutSettings,
    /// Parsed main-repository endpoint.
    pub server: ServerInfo,
}

impl AuthContext {
    /// Hosts this checkout must cover.
    pub fn hosts(&self) -> BTreeSet<String> {
        host_set::resolve(&self.server.host_name, &self.settings.compatible_hosts)
    }

    /// `(protocol, host)` pairs for credential records.
    pub fn combinable(&self) -> Vec<(&'static str, String)> {
        host_set::combinable(&self.hosts())
    }

    /// Username/password with the secret exposed, when both are present.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        let username = self.settings.auth.username.as_deref()?;
        let password = self.settings.auth.password.as_ref()?.expose_secret();
        Some((username, password))
    }

    /// Require basic auth for an http strategy.
    ///
    /// # Errors
    ///
    /// Returns a parameter error when username or password is missing.
    pub fn require_basic_auth(&self) -> Result<(&str, &str), AuthError> {
        if !self.settings.auth.has_basic_auth() {
            return Err(gco_core::CoreError::param_invalid(
                "username and password are required for http authentication",
            )
            .into());
        }
        self.basic_auth().ok_or_else(|| {
            gco_core::CoreError::param_invalid("username and password are required").into()
        })
    }

    /// Erase stale `oauth2` credentials other helpers may have cached.
    ///
    /// Tokens rotate per build; a cached token under the fixed `oauth2`
    /// username shadows the fresh one. Failures are logged only.
    pub async fn erase_oauth2_credential(&self, git: &GitClient) {
        if self.settings.auth.username.as_deref() != Some("oauth2") {
            return;
        }
        for (protocol, host) in self.combinable() {
            let record = CredentialRecord {
                username: Some("oauth2".to_string()),
                ..CredentialRecord::for_host(protocol, host)
            };
            if let Err(e) = git
                .credential(CredentialAction::Reject, &record.to_wire_string())
                .await
            {
                debug!("could not erase cached oauth2 credential: {e}");
            }
        }
    }

    /// Approve the step credentials into the configured helpers so later
    /// git invocations in the job can reuse them. Best effort.
    pub async fn store_global_credential(&self, git: &GitClient) {
        let Some((username, password)) = self.basic_auth() else {
            return;
        };
        for (protocol, host) in self.combinable() {
            let record = CredentialRecord::for_host(protocol, host)
                .with_credentials(username, password);
            if let Err(e) = git
                .credential(CredentialAction::Approve, &record.to_wire_string())
                .await
            {
                debug!("could not approve credential: {e}");
            }
        }
    }

    /// Sweep submodules on matching hosts, applying `ops_for` each.
    ///
    /// Per-submodule failures are logged and skipped; one broken submodule
    /// must not abort the checkout.
    pub async fn sweep_submodules(
        &self,
        git: &GitClient,
        ops_for: impl Fn(&ServerInfo) -> Vec<ConfigOp>,
    ) {
        let submodules = list_submodules(
            git,
            &self.settings.repository_path,
            self.settings.nested_submodules,
        )
        .await;
        let hosts = self.hosts();
        for submodule in submodules {
            let sub_server = match ServerInfo::parse(&submodule.url) {
                Ok(s) => s,
                Err(e) => {
                    debug!("skipping submodule {} with url {}: {e}", submodule.name, submodule.url);
                    continue;
                }
            };
            if !hosts.contains(&sub_server.host_name) || !submodule.absolute_path.exists() {
                continue;
            }
            for op in ops_for(&sub_server) {
                if let Err(e) = op.apply(git, &submodule.absolute_path).await {
                    debug!("submodule {} config op failed: {e}", submodule.name);
                }
            }
        }
    }
}

/// One local config mutation applied inside a submodule working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOp {
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
    /// Drop a whole config section, tolerating absence.
    RemoveSection {
        /// Section name, e.g. `url.https://host/`.
        section: String,
    },
}

impl ConfigOp {
    async fn apply(&self, git: &GitClient, dir: &Path) -> Result<(), gco_git::GitError> {
        let args: Vec<&str> = match self {
            Self::Set { key, value } => vec!["config", key, value],
            Self::Add { key, value } => vec!["config", "--add", key, value],
            Self::Unset { key } => vec!["config", "--unset", key],
            Self::UnsetAll { key } => vec!["config", "--unset-all", key],
            Self::RemoveSection { section } => vec!["config", "--remove-section", section],
        };
        match git.run_in_dir(dir, &args).await {
            Ok(_) => Ok(()),
            Err(e) if self.absence_is_fine() && e.exit_code().is_some() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn absence_is_fine(&self) -> bool {
        matches!(
            self,
            Self::Unset { .. } | Self::UnsetAll { .. } | Self::RemoveSection { .. }
        )
    }
}

/// `url.<origin>/.insteadOf` for an http origin.
pub(crate) fn http_instead_of_key(origin: &str) -> String {
    format!("url.{origin}/.insteadOf")
}

/// `url.git@<host>:.insteadOf` for an ssh host.
pub(crate) fn ssh_instead_of_key(host: &str) -> String {
    format!("url.git@{host}:.insteadOf")
}

/// The rewrite-source prefix of a submodule's own origin.
pub(crate) fn origin_prefix(server: &ServerInfo) -> String {
    if server.http_protocol {
        format!("{}/", server.origin)
    } else {
        format!("{}:", server.origin)
    }
}

/// Global rewrites redirecting ssh-form URLs at the http origin.
pub(crate) fn http_rewrite_plan(ctx: &AuthContext) -> RewritePlan {
    let key = http_instead_of_key(&ctx.server.origin);
    let hosts = ctx.hosts();
    let mut unset = Vec::new();
    for host in &hosts {
        unset.push(GlobalOp::Unset {
            key: ssh_instead_of_key(host),
        });
    }
    let mut write = vec![GlobalOp::UnsetAll { key: key.clone() }];
    for host in &hosts {
        write.push(GlobalOp::Add {
            key: key.clone(),
            value: format!("git@{host}:"),
        });
    }
    RewritePlan {
        unset,
        write,
        extra: Vec::new(),
    }
}

/// Global rewrites redirecting http-form URLs at the ssh host.
pub(crate) fn ssh_rewrite_plan(ctx: &AuthContext) -> RewritePlan {
    let key = ssh_instead_of_key(&ctx.server.host_name);
    let mut unset = Vec::new();
    let mut write = vec![GlobalOp::UnsetAll { key: key.clone() }];
    for (protocol, host) in ctx.combinable() {
        unset.push(GlobalOp::Unset {
            key: format!("url.{protocol}://{host}/.insteadOf"),
        });
        write.push(GlobalOp::Add {
            key: key.clone(),
            value: format!("{protocol}://{host}/"),
        });
    }
    RewritePlan {
        unset,
        write,
        extra: Vec::new(),
    }
}

/// Per-submodule rewrite ops for http strategies.
pub(crate) fn http_submodule_configure_ops(ctx: &AuthContext, sub: &ServerInfo) -> Vec<ConfigOp> {
    let key = http_instead_of_key(&ctx.server.origin);
    let mut ops = vec![ConfigOp::UnsetAll { key: key.clone() }];
    for host in ctx.hosts() {
        ops.push(ConfigOp::Add {
            key: key.clone(),
            value: format!("git@{host}:"),
        });
    }
    if sub.origin != ctx.server.origin {
        ops.push(ConfigOp::Add {
            key,
            value: origin_prefix(sub),
        });
    }
    ops
}

/// Undo of [`http_submodule_configure_ops`].
pub(crate) fn http_submodule_remove_ops(ctx: &AuthContext) -> Vec<ConfigOp> {
    vec![
        ConfigOp::UnsetAll {
            key: http_instead_of_key(&ctx.server.origin),
        },
        ConfigOp::RemoveSection {
            section: format!("url.{}/", ctx.server.origin),
        },
    ]
}

/// Per-submodule rewrite ops for the ssh strategy.
pub(crate) fn ssh_submodule_configure_ops(ctx: &AuthContext, sub: &ServerInfo) -> Vec<ConfigOp> {
    let key = ssh_instead_of_key(&ctx.server.host_name);
    let mut ops = vec![ConfigOp::UnsetAll { key: key.clone() }];
    for (protocol, host) in ctx.combinable() {
        ops.push(ConfigOp::Add {
            key: key.clone(),
            value: format!("{protocol}://{host}/"),
        });
    }
    if sub.origin != ctx.server.origin {
        ops.push(ConfigOp::Add {
            key,
            value: origin_prefix(sub),
        });
    }
    ops
}

/// Undo of [`ssh_submodule_configure_ops`].
pub(crate) fn ssh_submodule_remove_ops(ctx: &AuthContext) -> Vec<ConfigOp> {
    vec![
        ConfigOp::UnsetAll {
            key: ssh_instead_of_key(&ctx.server.host_name),
        },
        ConfigOp::RemoveSection {
            section: format!("url.git@{}:", ctx.server.host_name),
        },
    ]
}

/// A selected, ready-to-run credential strategy.
#[derive(Debug)]
pub enum AuthStrategy {
    /// Temporary askpass script plus `core.askpass`.
    AskPass(AskPassAuth),
    /// `store` helper with an explicit `--file`.
    StoreCredential(StoreCredentialAuth),
    /// Our own installed credential helper binary.
    CustomCredential(CustomCredentialAuth),
    /// Credentials embedded in the remote URL.
    UsernamePassword(UsernamePasswordAuth),
    /// ssh-agent with the supplied private key.
    Ssh(SshAuth),
}

impl AuthStrategy {
    /// Instantiate the strategy behind a selector decision.
    pub fn new(kind: AuthHelperType, settings: CheckoutSettings, server: ServerInfo) -> Self {
        let ctx = AuthContext { settings, server };
        match kind {
            AuthHelperType::AskPass => Self::AskPass(AskPassAuth::new(ctx)),
            AuthHelperType::StoreCredential => Self::StoreCredential(StoreCredentialAuth::new(ctx)),
            AuthHelperType::CustomCredential => {
                Self::CustomCredential(CustomCredentialAuth::new(ctx))
            }
            AuthHelperType::UsernamePassword => {
                Self::UsernamePassword(UsernamePasswordAuth::new(ctx))
            }
            AuthHelperType::Ssh => Self::Ssh(SshAuth::new(ctx)),
        }
    }

    /// Which mechanism this is.
    pub fn helper_type(&self) -> AuthHelperType {
        match self {
            Self::AskPass(_) => AuthHelperType::AskPass,
            Self::StoreCredential(_) => AuthHelperType::StoreCredential,
            Self::CustomCredential(_) => AuthHelperType::CustomCredential,
            Self::UsernamePassword(_) => AuthHelperType::UsernamePassword,
            Self::Ssh(_) => AuthHelperType::Ssh,
        }
    }

    /// Wire credentials into the main repository.
    ///
    /// # Errors
    ///
    /// Fails on missing credentials or unrecoverable git errors.
    pub async fn configure_auth(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        match self {
            Self::AskPass(s) => s.configure(git).await,
            Self::StoreCredential(s) => s.configure(git).await,
            Self::CustomCredential(s) => s.configure(git).await,
            Self::UsernamePassword(s) => s.configure(git).await,
            Self::Ssh(s) => s.configure(git).await,
        }
    }

    /// Undo [`Self::configure_auth`] on the main repository.
    ///
    /// # Errors
    ///
    /// Fails on unrecoverable git errors; absent keys never fail.
    pub async fn remove_auth(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        match self {
            Self::AskPass(s) => s.remove(git).await,
            Self::StoreCredential(s) => s.remove(git).await,
            Self::CustomCredential(s) => s.remove(git).await,
            Self::UsernamePassword(s) => s.remove(git).await,
            Self::Ssh(s) => s.remove(git).await,
        }
    }

    /// Enter the guarded global scope with this strategy's rewrites.
    ///
    /// # Errors
    ///
    /// Fails when the scratch scope cannot be set up.
    pub async fn configure_global_auth(
        &mut self,
        git: &mut GitClient,
    ) -> Result<GlobalScopeGuard, AuthError> {
        match self {
            Self::AskPass(s) => s.configure_global(git).await,
            Self::StoreCredential(s) => s.configure_global(git).await,
            Self::CustomCredential(s) => s.configure_global(git).await,
            Self::UsernamePassword(s) => s.configure_global(git).await,
            Self::Ssh(s) => s.configure_global(git).await,
        }
    }

    /// Leave the guarded global scope. Never fails; problems are logged.
    pub async fn remove_global_auth(&mut self, git: &mut GitClient, guard: GlobalScopeGuard) {
        guard.teardown(git).await;
    }

    /// Sweep submodules, wiring the mechanism into each.
    pub async fn configure_submodule_auth(&mut self, git: &mut GitClient) {
        match self {
            Self::AskPass(s) => s.configure_submodules(git).await,
            Self::StoreCredential(s) => s.configure_submodules(git).await,
            Self::CustomCredential(s) => s.configure_submodules(git).await,
            Self::UsernamePassword(s) => s.configure_submodules(git).await,
            Self::Ssh(s) => s.configure_submodules(git).await,
        }
    }

    /// Sweep submodules, removing what configure wrote.
    pub async fn remove_submodule_auth(&mut self, git: &mut GitClient) {
        match self {
            Self::AskPass(s) => s.remove_submodules(git).await,
            Self::StoreCredential(s) => s.remove_submodules(git).await,
            Self::CustomCredential(s) => s.remove_submodules(git).await,
            Self::UsernamePassword(s) => s.remove_submodules(git).await,
            Self::Ssh(s) => s.remove_submodules(git).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ctx(url: &str) -> AuthContext {
        AuthContext {
            settings: CheckoutSettings::new(url, "/data/ws"),
            server: ServerInfo::parse(url).unwrap(),
        }
    }

    #[test]
    fn test_should_build_instead_of_keys() {
        assert_eq!(
            http_instead_of_key("https://git.example.com"),
            "url.https://git.example.com/.insteadOf"
        );
        assert_eq!(
            ssh_instead_of_key("git.example.com"),
            "url.git@git.example.com:.insteadOf"
        );
    }

    #[test]
    fn test_should_compute_origin_prefix() {
        let http = ServerInfo::parse("https://git.example.com/a/b.git").unwrap();
        assert_eq!(origin_prefix(&http), "https://git.example.com/");
        let ssh = ServerInfo::parse("git@git.example.com:a/b.git").unwrap();
        assert_eq!(origin_prefix(&ssh), "git@git.example.com:");
    }

    #[test]
    fn test_should_expose_basic_auth_only_when_complete() {
        let mut context = ctx("https://git.example.com/a/b.git");
        assert!(context.basic_auth().is_none());
        assert!(context.require_basic_auth().is_err());

        context.settings.auth = gco_core::settings::AuthInfo::with_password("u", "p");
        assert_eq!(context.basic_auth(), Some(("u", "p")));
    }

    #[test]
    fn test_should_dispatch_helper_type() {
        let url = "https://git.example.com/a/b.git";
        let settings = CheckoutSettings::new(url, "/data/ws");
        let server = ServerInfo::parse(url).unwrap();
        for kind in [
            AuthHelperType::AskPass,
            AuthHelperType::StoreCredential,
            AuthHelperType::CustomCredential,
            AuthHelperType::UsernamePassword,
            AuthHelperType::Ssh,
        ] {
            let strategy = AuthStrategy::new(kind, settings.clone(), server.clone());
            assert_eq!(strategy.helper_type(), kind);
        }
    }
}
