//! Git-related error types.

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Git command failed with an exit code.
    #[error("git {command} failed: {message}")]
    CommandFailed {
        /// The git subcommand that failed.
        command: String,
        /// Error message from stderr.
        message: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },

    /// Git binary not found.
    #[error("git executable not found in PATH")]
    NotFound,

    /// The remote URL could not be interpreted.
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    /// The reported git version string could not be parsed.
    #[error("unrecognized git version output: {0}")]
    InvalidVersion(String),

    /// I/O error from subprocess.
    #[error("git IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Get the exit code if this was a command failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Whether this failure means "config key not found".
    ///
    /// `git config --get` exits 1 for a missing key and `--unset` exits 5
    /// when there was nothing to unset; both are an expected steady state.
    pub fn is_config_not_found(&self) -> bool {
        matches!(self.exit_code(), Some(1 | 5))
    }
}
