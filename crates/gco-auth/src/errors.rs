use gco_core::CoreError;
use gco_git::GitError;
use thiserror::Error;

/// Errors produced while configuring or removing authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid step input or another core failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A git invocation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Malformed credential-helper wire input.
    #[error("credential input error: {0}")]
    Wire(String),

    /// The credential store file is broken or unreachable.
    #[error("credential store error: {0}")]
    Store(String),

    /// ssh-agent or ssh-add misbehaved.
    #[error("ssh agent error: {0}")]
    SshAgent(String),

    /// Filesystem error outside of git.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Whether this is a caller error rather than an environment failure.
    pub fn is_param_error(&self) -> bool {
        matches!(self, Self::Core(CoreError::ParamInvalid(_)) | Self::Wire(_))
    }
}
