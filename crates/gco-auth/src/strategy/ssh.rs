//! ssh-agent strategy for SSH-style remotes.

use tracing::info;

use gco_core::CoreError;
use gco_core::agent;
use gco_git::{ConfigScope, GitClient, ServerInfo};

use crate::errors::AuthError;
use crate::scope::GlobalScopeGuard;
use crate::ssh_agent;
use crate::types::{
    AUTH_HELPER_KEY, AuthHelperType, GIT_SSH_COMMAND_VALUE, SSH_AGENT_PID_KEY,
};

use super::{AuthContext, ssh_rewrite_plan, ssh_submodule_configure_ops, ssh_submodule_remove_ops};

const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";
const SSH_AGENT_PID: &str = "SSH_AGENT_PID";

/// ssh-agent credential strategy.
#[derive(Debug)]
pub struct SshAuth {
    ctx: AuthContext,
}

impl SshAuth {
    pub(crate) fn new(ctx: AuthContext) -> Self {
        Self { ctx }
    }

    pub(crate) async fn configure(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        if !self.ctx.settings.auth.has_private_key() {
            return Err(CoreError::param_invalid("private key must not be empty").into());
        }
        let Some(private_key) = self.ctx.settings.auth.private_key.clone() else {
            return Err(CoreError::param_invalid("private key must not be empty").into());
        };
        info!("loading private key for {} into ssh-agent", self.ctx.server.origin);

        let ssh = ssh_agent::start(&private_key, self.ctx.settings.auth.passphrase.as_ref()).await?;
        git.set_env(SSH_AUTH_SOCK, ssh.auth_sock.clone());
        git.set_env(SSH_AGENT_PID, ssh.pid.clone());
        git.set_env(agent::GIT_SSH_COMMAND, GIT_SSH_COMMAND_VALUE);

        git.config_set(
            AUTH_HELPER_KEY,
            AuthHelperType::Ssh.as_config_value(),
            ConfigScope::Local,
        )
        .await?;
        // The pid survives into a cleanup pass in another process.
        git.config_set(SSH_AGENT_PID_KEY, &ssh.pid, ConfigScope::Local).await?;
        Ok(())
    }

    pub(crate) async fn remove(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        if let Some(pid) = git.try_config_get(SSH_AGENT_PID_KEY).await? {
            ssh_agent::kill(&pid).await;
            git.try_config_unset(SSH_AGENT_PID_KEY, ConfigScope::Local).await?;
        }
        git.remove_env(agent::GIT_SSH_COMMAND);
        git.remove_env(SSH_AUTH_SOCK);
        git.remove_env(SSH_AGENT_PID);
        git.try_config_unset(AUTH_HELPER_KEY, ConfigScope::Local).await?;
        Ok(())
    }

    pub(crate) async fn configure_global(
        &mut self,
        git: &mut GitClient,
    ) -> Result<GlobalScopeGuard, AuthError> {
        let plan = ssh_rewrite_plan(&self.ctx);
        GlobalScopeGuard::enter(git, &self.ctx.settings, false, &plan).await
    }

    pub(crate) async fn configure_submodules(&mut self, git: &mut GitClient) {
        let ctx = self.ctx.clone();
        self.ctx
            .sweep_submodules(git, move |sub: &ServerInfo| {
                ssh_submodule_configure_ops(&ctx, sub)
            })
            .await;
    }

    pub(crate) async fn remove_submodules(&mut self, git: &mut GitClient) {
        let ctx = self.ctx.clone();
        self.ctx
            .sweep_submodules(git, move |_sub: &ServerInfo| ssh_submodule_remove_ops(&ctx))
            .await;
    }
}
