//! ssh-agent lifecycle for the SSH strategy.
//!
//! The key never touches the repository: it goes into a 0600 temp file just
//! long enough for `ssh-add`, then the file is removed. Passphrases are fed
//! through a one-shot `SSH_ASKPASS` shim because ssh-add refuses to read
//! them from stdin without a TTY.

use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, warn};

use gco_core::agent::{self, OsKind};

use crate::errors::AuthError;

static AUTH_SOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SSH_AUTH_SOCK=([^;]+);").expect("valid regex"));
static AGENT_PID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SSH_AGENT_PID=(\d+);").expect("valid regex"));

/// A running agent holding the checkout key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAgent {
    /// Socket path for `SSH_AUTH_SOCK`.
    pub auth_sock: String,
    /// Agent process id, persisted for cleanup.
    pub pid: String,
}

/// Start an agent and load `private_key` into it.
///
/// # Errors
///
/// Fails when ssh-agent cannot be started, its output cannot be parsed, or
/// ssh-add rejects the key.
pub async fn start(
    private_key: &SecretString,
    passphrase: Option<&SecretString>,
) -> Result<SshAgent, AuthError> {
    let output = Command::new("ssh-agent")
        .arg("-s")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| AuthError::SshAgent(format!("failed to start ssh-agent: {e}")))?;
    if !output.status.success() {
        return Err(AuthError::SshAgent(format!(
            "ssh-agent exited with {:?}",
            output.status.code()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let agent = parse_agent_output(&stdout)?;
    debug!("started ssh-agent pid {}", agent.pid);

    add_key(&agent, private_key, passphrase).await?;
    Ok(agent)
}

/// Stop an agent by pid. Failures are logged, not propagated: the agent may
/// already be gone after a container restart.
pub async fn kill(pid: &str) {
    let result = if agent::os_kind() == OsKind::Windows {
        Command::new("taskkill").args(["/PID", pid, "/F"]).output().await
    } else {
        Command::new("kill").arg(pid).output().await
    };
    match result {
        Ok(out) if out.status.success() => debug!("stopped ssh-agent pid {pid}"),
        Ok(out) => warn!("could not stop ssh-agent pid {pid}: exit {:?}", out.status.code()),
        Err(e) => warn!("could not stop ssh-agent pid {pid}: {e}"),
    }
}

fn parse_agent_output(stdout: &str) -> Result<SshAgent, AuthError> {
    let auth_sock = AUTH_SOCK
        .captures(stdout)
        .map(|c| c[1].to_string())
        .ok_or_else(|| AuthError::SshAgent("no SSH_AUTH_SOCK in ssh-agent output".to_string()))?;
    let pid = AGENT_PID
        .captures(stdout)
        .map(|c| c[1].to_string())
        .ok_or_else(|| AuthError::SshAgent("no SSH_AGENT_PID in ssh-agent output".to_string()))?;
    Ok(SshAgent { auth_sock, pid })
}

async fn add_key(
    agent: &SshAgent,
    private_key: &SecretString,
    passphrase: Option<&SecretString>,
) -> Result<(), AuthError> {
    // ssh-add insists on a trailing newline in key files.
    let mut key_material = private_key.expose_secret().to_string();
    if !key_material.ends_with('\n') {
        key_material.push('\n');
    }
    let key_file = write_restricted(".key", &key_material)?;

    let mut cmd = Command::new("ssh-add");
    cmd.arg(key_file.path());
    cmd.env("SSH_AUTH_SOCK", &agent.auth_sock);
    cmd.stdin(Stdio::null());

    // Scope the askpass shim to this call; the temp file drops right after.
    let _askpass = match passphrase {
        Some(phrase) => {
            let shim = write_restricted(askpass_suffix(), &askpass_script(phrase))?;
            cmd.env("SSH_ASKPASS", shim.path());
            cmd.env("SSH_ASKPASS_REQUIRE", "force");
            cmd.env("DISPLAY", ":0");
            Some(shim)
        }
        None => None,
    };

    let output = cmd
        .output()
        .await
        .map_err(|e| AuthError::SshAgent(format!("failed to run ssh-add: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(AuthError::SshAgent(format!(
            "ssh-add failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

fn askpass_suffix() -> &'static str {
    if agent::os_kind() == OsKind::Windows {
        ".bat"
    } else {
        ".sh"
    }
}

fn askpass_script(passphrase: &SecretString) -> String {
    let phrase = passphrase.expose_secret();
    if agent::os_kind() == OsKind::Windows {
        format!("@echo off\r\necho {phrase}\r\n")
    } else {
        format!("#!/bin/sh\necho '{}'\n", phrase.replace('\'', r"'\''"))
    }
}

fn write_restricted(suffix: &str, contents: &str) -> Result<tempfile::NamedTempFile, AuthError> {
    use std::io::Write;

    let mut file = tempfile::Builder::new().prefix("gco-ssh-").suffix(suffix).tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    restrict(file.path())?;
    Ok(file)
}

#[cfg(unix)]
fn restrict(path: &std::path::Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict(_path: &std::path::Path) -> Result<(), AuthError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_should_parse_agent_output() {
        let stdout = "SSH_AUTH_SOCK=/tmp/ssh-XXXX/agent.123; export SSH_AUTH_SOCK;\n\
                      SSH_AGENT_PID=124; export SSH_AGENT_PID;\n\
                      echo Agent pid 124;";
        let agent = parse_agent_output(stdout).unwrap();
        assert_eq!(agent.auth_sock, "/tmp/ssh-XXXX/agent.123");
        assert_eq!(agent.pid, "124");
    }

    #[test]
    fn test_should_reject_incomplete_agent_output() {
        assert!(parse_agent_output("echo Agent pid 124;").is_err());
        assert!(parse_agent_output("SSH_AUTH_SOCK=/tmp/a; export SSH_AUTH_SOCK;").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_should_quote_passphrase_in_shim() {
        let script = askpass_script(&SecretString::from("pa's".to_string()));
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains(r"echo 'pa'\''s'"));
    }
}
