//! Strategy tags and the git config keys the auth core owns.

use std::fmt;

/// Config key recording which strategy configured the repository.
pub const AUTH_HELPER_KEY: &str = "credential.gcoAuthHelper";
/// Config key recording the task that stored per-task credentials.
pub const TASK_ID_KEY: &str = "credential.gcoTaskId";
/// Config key (global) publishing the compatible-host list to the helper.
pub const COMPATIBLE_HOST_KEY: &str = "credential.gcoCompatibleHost";
/// Config key recording the insteadOf key written for submodule sweeps.
pub const INSTEAD_OF_KEY: &str = "gco.insteadOfKey";
/// Config key recording the ssh-agent pid started for this checkout.
pub const SSH_AGENT_PID_KEY: &str = "gco.sshAgentPid";
/// The multi-valued key git resolves helpers from.
pub const CREDENTIAL_HELPER_KEY: &str = "credential.helper";
/// Value regex identifying our own installed helper among others.
pub const HELPER_SIGNATURE: &str = "gco-credential";
/// `GIT_SSH_COMMAND` value used with the ssh strategy.
pub const GIT_SSH_COMMAND_VALUE: &str = "ssh -o StrictHostKeyChecking=no";

/// The five credential mechanisms.
///
/// The name round-trips through [`AUTH_HELPER_KEY`] so a later cleanup
/// invocation can reconstruct the strategy that ran configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHelperType {
    /// Temporary askpass script plus `core.askpass`.
    AskPass,
    /// `store` helper with an explicit `--file`.
    StoreCredential,
    /// Our own installed credential helper binary.
    CustomCredential,
    /// Credentials embedded in the remote URL.
    UsernamePassword,
    /// ssh-agent with the supplied private key.
    Ssh,
}

impl AuthHelperType {
    /// Marker value persisted in git config.
    pub fn as_config_value(self) -> &'static str {
        match self {
            Self::AskPass => "ASK_PASS",
            Self::StoreCredential => "STORE_CREDENTIAL",
            Self::CustomCredential => "CUSTOM_CREDENTIAL",
            Self::UsernamePassword => "USERNAME_PASSWORD",
            Self::Ssh => "SSH",
        }
    }

    /// Reverse of [`Self::as_config_value`]. Unknown markers yield `None`.
    pub fn from_config_value(value: &str) -> Option<Self> {
        match value.trim() {
            "ASK_PASS" => Some(Self::AskPass),
            "STORE_CREDENTIAL" => Some(Self::StoreCredential),
            "CUSTOM_CREDENTIAL" => Some(Self::CustomCredential),
            "USERNAME_PASSWORD" => Some(Self::UsernamePassword),
            "SSH" => Some(Self::Ssh),
            _ => None,
        }
    }
}

impl fmt::Display for AuthHelperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_value())
    }
}
