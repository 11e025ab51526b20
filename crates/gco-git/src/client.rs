//! Git client that wraps the git command-line tool.
//!
//! The client owns a process-level environment overlay: overrides set via
//! [`GitClient::set_env`] apply to every spawned git process but never to
//! the agent's real environment. The global-scope guard relies on this to
//! redirect HOME / XDG_CONFIG_HOME without touching concurrent builds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use gco_core::redact::redact_line;

use crate::errors::GitError;
use crate::version::GitVersion;

/// Which configuration file a config operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    /// The repository-local `.git/config`.
    Local,
    /// The global config as resolved under the current env overlay.
    Global,
    /// An explicit config file (e.g. `.gitmodules`).
    File(PathBuf),
}

impl ConfigScope {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::Local => {}
            Self::Global => args.push("--global".to_string()),
            Self::File(path) => {
                args.push("-f".to_string());
                args.push(path.display().to_string());
            }
        }
    }
}

/// Action verbs understood by `git credential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialAction {
    /// Persist a credential into the configured helpers.
    Approve,
    /// Ask the configured helpers for a credential.
    Fill,
    /// Erase a credential from the configured helpers.
    Reject,
}

impl CredentialAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Fill => "fill",
            Self::Reject => "reject",
        }
    }
}

/// Client for executing git commands with a scoped environment overlay.
#[derive(Debug, Clone)]
pub struct GitClient {
    /// Path to the git binary.
    git_path: PathBuf,
    /// Working directory for git commands.
    repo_dir: PathBuf,
    /// Environment overrides applied to every spawned git process.
    env: HashMap<String, String>,
    /// Cached `git --version` probe.
    version: Option<GitVersion>,
}

impl GitClient {
    /// Create a new git client rooted at `repo_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] if git is not in PATH.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Result<Self, GitError> {
        let git_path = which::which("git").map_err(|_| GitError::NotFound)?;
        Ok(Self {
            git_path,
            repo_dir: repo_dir.into(),
            env: HashMap::new(),
            version: None,
        })
    }

    /// The repository working directory.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Set an environment override for subsequent git processes.
    ///
    /// Returns the previous override, if any.
    pub fn set_env(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.env.insert(key.into(), value.into())
    }

    /// Remove an environment override, restoring the inherited value.
    ///
    /// Returns the removed override, if any.
    pub fn remove_env(&mut self, key: &str) -> Option<String> {
        self.env.remove(key)
    }

    /// Read back a currently set environment override.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Execute a git command in the repository directory and return stdout.
    #[instrument(skip(self), fields(args = ?args))]
    pub async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        self.run_in_dir(&self.repo_dir, args).await
    }

    /// Execute a git command in an arbitrary directory (submodule sweeps).
    pub async fn run_in_dir(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let (stdout, exit_code) = self.spawn(dir, args, None).await?;
        if let Some(0) = exit_code {
            Ok(stdout)
        } else {
            Err(GitError::CommandFailed {
                command: args.first().copied().unwrap_or("").to_string(),
                message: stdout,
                exit_code,
            })
        }
    }

    async fn spawn(
        &self,
        dir: &Path,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<(String, Option<i32>), GitError> {
        let mut cmd = Command::new(&self.git_path);
        cmd.args(args);
        cmd.current_dir(dir);
        cmd.envs(&self.env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            drop(pipe);
        }
        let output = child.wait_with_output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines().chain(stderr.lines()) {
            debug!("git: {}", redact_line(line));
        }

        if output.status.success() {
            Ok((stdout, Some(0)))
        } else {
            let message = if stderr.trim().is_empty() {
                stdout.clone()
            } else {
                redact_line(stderr.trim()).into_owned()
            };
            Ok((message, output.status.code()))
        }
    }

    /// Probe and cache the git version.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be executed or reports garbage.
    pub async fn version(&mut self) -> Result<GitVersion, GitError> {
        if let Some(v) = self.version {
            return Ok(v);
        }
        let output = self.run(&["--version"]).await?;
        let version = GitVersion::parse(&output)?;
        self.version = Some(version);
        Ok(version)
    }

    /// Whether the agent's git is at least `wanted`.
    pub async fn is_at_least_version(&mut self, wanted: GitVersion) -> bool {
        match self.version().await {
            Ok(v) => v.is_at_least(wanted),
            Err(_) => false,
        }
    }

    // =====================================================================
    // Config operations
    // =====================================================================

    /// Get a config value, failing when the key is absent.
    pub async fn config_get(&self, key: &str, scope: ConfigScope) -> Result<String, GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push(key.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&refs).await?;
        Ok(first_line(&output).to_string())
    }

    /// Get a repository-local config value, treating "absent" as `None`.
    pub async fn try_config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        self.try_config_get_scoped(key, ConfigScope::Local).await
    }

    /// Get a config value in a scope, treating "absent" as `None`.
    pub async fn try_config_get_scoped(
        &self,
        key: &str,
        scope: ConfigScope,
    ) -> Result<Option<String>, GitError> {
        match self.config_get(key, scope).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_config_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get all values of a multi-valued key, empty when absent.
    pub async fn try_config_get_all(
        &self,
        key: &str,
        scope: ConfigScope,
    ) -> Result<Vec<String>, GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push("--get-all".to_string());
        args.push(key.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&refs).await {
            Ok(output) => Ok(output.lines().map(str::to_string).collect()),
            Err(e) if e.is_config_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Get `(key, value)` pairs for keys matching a regex, empty when none.
    pub async fn try_config_get_regexp(
        &self,
        key_regex: &str,
        scope: ConfigScope,
    ) -> Result<Vec<(String, String)>, GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push("--get-regexp".to_string());
        args.push(key_regex.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&refs).await {
            Ok(output) => Ok(output
                .lines()
                .filter_map(|line| {
                    line.split_once(' ')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect()),
            Err(e) if e.is_config_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Set (replace) a config value.
    pub async fn config_set(
        &self,
        key: &str,
        value: &str,
        scope: ConfigScope,
    ) -> Result<(), GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push(key.to_string());
        args.push(value.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs).await?;
        Ok(())
    }

    /// Add a value to a multi-valued config key.
    pub async fn config_add(
        &self,
        key: &str,
        value: &str,
        scope: ConfigScope,
    ) -> Result<(), GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push("--add".to_string());
        args.push(key.to_string());
        args.push(value.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs).await?;
        Ok(())
    }

    /// Unset a config key, swallowing "was not set".
    pub async fn try_config_unset(&self, key: &str, scope: ConfigScope) -> Result<(), GitError> {
        self.try_unset_inner(key, scope, false).await
    }

    /// Unset all values of a config key, swallowing "was not set".
    pub async fn try_config_unset_all(
        &self,
        key: &str,
        scope: ConfigScope,
    ) -> Result<(), GitError> {
        self.try_unset_inner(key, scope, true).await
    }

    async fn try_unset_inner(
        &self,
        key: &str,
        scope: ConfigScope,
        all: bool,
    ) -> Result<(), GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push(if all { "--unset-all" } else { "--unset" }.to_string());
        args.push(key.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&refs).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_config_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove a whole config section, swallowing "no such section".
    pub async fn try_remove_section(
        &self,
        section: &str,
        scope: ConfigScope,
    ) -> Result<(), GitError> {
        let mut args = vec!["config".to_string()];
        scope.push_args(&mut args);
        args.push("--remove-section".to_string());
        args.push(section.to_string());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&refs).await {
            Ok(_) => Ok(()),
            Err(e) if e.exit_code().is_some() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether any value of `key` matches `value_regex` in `scope`.
    pub async fn config_exists(
        &self,
        key: &str,
        value_regex: &str,
        scope: ConfigScope,
    ) -> Result<bool, GitError> {
        let values = self.try_config_get_all(key, scope).await?;
        let re = regex::Regex::new(value_regex)
            .map_err(|e| GitError::InvalidUrl(format!("bad config value regex: {e}")))?;
        Ok(values.iter().any(|v| re.is_match(v)))
    }

    /// Register an empty `credential.helper` entry ahead of ours so git
    /// drops all previously configured helpers (git >= 2.9).
    pub async fn disable_other_helpers(&self, scope: ConfigScope) -> Result<(), GitError> {
        self.config_add("credential.helper", "", scope).await
    }

    /// Point a remote at a new URL.
    pub async fn remote_set_url(&self, remote: &str, url: &str) -> Result<(), GitError> {
        self.run(&["remote", "set-url", remote, url]).await?;
        Ok(())
    }

    /// Feed a credential record to `git credential <action>`.
    ///
    /// The caller provides the wire-format input including the terminating
    /// blank line; output (for `fill`) is returned verbatim.
    pub async fn credential(
        &self,
        action: CredentialAction,
        input: &str,
    ) -> Result<String, GitError> {
        let args = ["credential", action.as_str()];
        let (output, exit_code) = self.spawn(&self.repo_dir, &args, Some(input)).await?;
        if let Some(0) = exit_code {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                command: format!("credential {}", action.as_str()),
                message: output,
                exit_code,
            })
        }
    }
}

/// Get the first line of output.
fn first_line(output: &str) -> &str {
    output.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_build_scope_args() {
        let mut args = vec!["config".to_string()];
        ConfigScope::Local.push_args(&mut args);
        assert_eq!(args, vec!["config"]);

        let mut args = vec!["config".to_string()];
        ConfigScope::Global.push_args(&mut args);
        assert_eq!(args, vec!["config", "--global"]);

        let mut args = vec!["config".to_string()];
        ConfigScope::File(PathBuf::from(".gitmodules")).push_args(&mut args);
        assert_eq!(args, vec!["config", "-f", ".gitmodules"]);
    }

    #[test]
    fn test_should_map_credential_actions() {
        assert_eq!(CredentialAction::Approve.as_str(), "approve");
        assert_eq!(CredentialAction::Fill.as_str(), "fill");
        assert_eq!(CredentialAction::Reject.as_str(), "reject");
    }

    #[test]
    fn test_should_track_env_overlay() {
        let Ok(mut client) = GitClient::new("/tmp") else {
            // No git on this machine; overlay bookkeeping needs a client.
            return;
        };
        assert!(client.set_env("HOME", "/scratch/a").is_none());
        assert_eq!(client.set_env("HOME", "/scratch/b").as_deref(), Some("/scratch/a"));
        assert_eq!(client.env_var("HOME"), Some("/scratch/b"));
        assert_eq!(client.remove_env("HOME").as_deref(), Some("/scratch/b"));
        assert!(client.env_var("HOME").is_none());
        assert!(client.remove_env("HOME").is_none());
    }

    #[test]
    fn test_should_return_first_line() {
        assert_eq!(first_line("a\nb"), "a");
        assert_eq!(first_line(""), "");
    }
}
