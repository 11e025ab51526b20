//! `core.askpass` strategy.
//!
//! A generated one-shot script answers git's Username/Password prompts.
//! Used when a foreign global credential helper is configured or no home
//! directory exists for the custom helper's store.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use gco_core::agent::{self, OsKind};
use gco_git::version::SUPPORT_EMPTY_CRED_HELPER;
use gco_git::{ConfigScope, GitClient, ServerInfo};

use crate::errors::AuthError;
use crate::scope::{GlobalOp, GlobalScopeGuard};
use crate::types::{AUTH_HELPER_KEY, AuthHelperType, CREDENTIAL_HELPER_KEY};

use super::{
    AuthContext, ConfigOp, http_rewrite_plan, http_submodule_configure_ops,
    http_submodule_remove_ops,
};

const CORE_ASKPASS_KEY: &str = "core.askpass";

/// Askpass-script credential strategy.
#[derive(Debug)]
pub struct AskPassAuth {
    ctx: AuthContext,
    askpass_path: Option<PathBuf>,
}

impl AskPassAuth {
    pub(crate) fn new(ctx: AuthContext) -> Self {
        Self {
            ctx,
            askpass_path: None,
        }
    }

    pub(crate) async fn configure(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        let (username, password) = self.ctx.require_basic_auth()?;
        info!(
            "configuring askpass credentials for {username}@{}",
            self.ctx.server.origin
        );

        let script = askpass_script(agent::os_kind(), username, password);
        let path = write_askpass_script(&script)?;
        git.set_env(agent::GIT_ASKPASS, path.display().to_string());
        git.config_set(CORE_ASKPASS_KEY, &path.display().to_string(), ConfigScope::Local)
            .await?;
        self.askpass_path = Some(path);

        git.config_set(
            AUTH_HELPER_KEY,
            AuthHelperType::AskPass.as_config_value(),
            ConfigScope::Local,
        )
        .await?;
        self.ctx.store_global_credential(git).await;
        if git.is_at_least_version(SUPPORT_EMPTY_CRED_HELPER).await {
            git.disable_other_helpers(ConfigScope::Local).await?;
        }
        Ok(())
    }

    pub(crate) async fn remove(&mut self, git: &mut GitClient) -> Result<(), AuthError> {
        if let Some(script) = git.try_config_get(CORE_ASKPASS_KEY).await? {
            let script = PathBuf::from(script);
            if script.exists()
                && let Err(e) = std::fs::remove_file(&script)
            {
                debug!("could not remove askpass script {script:?}: {e}");
            }
        }
        git.remove_env(agent::GIT_ASKPASS);
        git.try_config_unset(CORE_ASKPASS_KEY, ConfigScope::Local).await?;
        git.try_config_unset_all(CREDENTIAL_HELPER_KEY, ConfigScope::Local).await?;
        git.try_config_unset(AUTH_HELPER_KEY, ConfigScope::Local).await?;
        self.askpass_path = None;
        Ok(())
    }

    pub(crate) async fn configure_global(
        &mut self,
        git: &mut GitClient,
    ) -> Result<GlobalScopeGuard, AuthError> {
        let mut plan = http_rewrite_plan(&self.ctx);
        // The scratch config starts as a copy of the real one; a helper
        // inherited from there would shadow askpass.
        plan.extra.push(GlobalOp::UnsetAll {
            key: CREDENTIAL_HELPER_KEY.to_string(),
        });
        GlobalScopeGuard::enter(git, &self.ctx.settings, true, &plan).await
    }

    pub(crate) async fn configure_submodules(&mut self, git: &mut GitClient) {
        let askpass = match &self.askpass_path {
            Some(path) => path.display().to_string(),
            None => match git.try_config_get(CORE_ASKPASS_KEY).await {
                Ok(Some(path)) => path,
                _ => return,
            },
        };
        let ctx = self.ctx.clone();
        self.ctx
            .sweep_submodules(git, move |sub: &ServerInfo| {
                let mut ops = http_submodule_configure_ops(&ctx, sub);
                ops.push(ConfigOp::Set {
                    key: CORE_ASKPASS_KEY.to_string(),
                    value: askpass.clone(),
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
                ops.push(ConfigOp::Unset {
                    key: CORE_ASKPASS_KEY.to_string(),
                });
                ops
            })
            .await;
    }
}

fn askpass_script(kind: OsKind, username: &str, password: &str) -> String {
    match kind {
        OsKind::Unix => format!(
            "#!/bin/sh\n\
             case \"$1\" in\n\
             Username*) echo '{}' ;;\n\
             Password*) echo '{}' ;;\n\
             esac\n",
            shell_quote(username),
            shell_quote(password)
        ),
        OsKind::Windows => format!(
            "@echo off\r\n\
             set prompt=%~1\r\n\
             if /i \"%prompt:~0,8%\"==\"Username\" (echo {username}) else (echo {password})\r\n"
        ),
    }
}

fn shell_quote(value: &str) -> String {
    value.replace('\'', r"'\''")
}

fn write_askpass_script(script: &str) -> Result<PathBuf, AuthError> {
    let suffix = if agent::os_kind() == OsKind::Windows {
        ".bat"
    } else {
        ".sh"
    };
    let file = tempfile::Builder::new()
        .prefix("gco-askpass-")
        .suffix(suffix)
        .tempfile()?;
    std::fs::write(file.path(), script)?;
    make_executable(file.path())?;
    let (_file, path) = file.keep().map_err(|e| AuthError::Io(e.error))?;
    Ok(path)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}
