//! Checkout step settings and the credential bundle.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

/// Credentials supplied by the pipeline for the remote host.
///
/// At most one of (username+password) or (private key) is meaningful for a
/// given strategy. Secret material never appears in `Debug` output.
#[derive(Clone, Default)]
pub struct AuthInfo {
    /// Basic-auth username (or token username such as `oauth2`).
    pub username: Option<String>,
    /// Basic-auth password or access token.
    pub password: Option<SecretString>,
    /// SSH private key in PEM/OpenSSH format.
    pub private_key: Option<SecretString>,
    /// Passphrase protecting the private key, if any.
    pub passphrase: Option<SecretString>,
}

impl AuthInfo {
    /// Username/password pair for basic authentication.
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(SecretString::from(password.into())),
            ..Self::default()
        }
    }

    /// SSH key material, optionally passphrase protected.
    pub fn with_private_key(private_key: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            private_key: Some(SecretString::from(private_key.into())),
            passphrase: passphrase.map(SecretString::from),
            ..Self::default()
        }
    }

    /// Whether a usable username/password pair is present.
    pub fn has_basic_auth(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self
                .password
                .as_ref()
                .is_some_and(|p| !p.expose_secret().trim().is_empty())
    }

    /// Whether a non-blank private key is present.
    pub fn has_private_key(&self) -> bool {
        self.private_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Everything the auth core needs to know about the current step.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Remote URL of the main repository.
    pub repository_url: String,
    /// Working directory of the main repository on the agent.
    pub repository_path: PathBuf,
    /// Credentials for the remote host.
    pub auth: AuthInfo,
    /// Hostnames fronting the same backend as the primary host.
    pub compatible_hosts: Vec<String>,
    /// Write URL rewrites into the real global scope (isolated agents only).
    pub enable_global_instead_of: bool,
    /// Recurse into nested submodules during the auth sweep.
    pub nested_submodules: bool,
    /// Pipeline identifier, for scratch-path namespacing.
    pub pipeline_id: String,
    /// Job identifier, for scratch-path namespacing.
    pub job_id: String,
    /// Task identifier, keys per-task credentials.
    pub task_id: String,
}

impl CheckoutSettings {
    /// Minimal settings for a repository at `url` checked out at `path`.
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            repository_url: url.into(),
            repository_path: path.into(),
            auth: AuthInfo::default(),
            compatible_hosts: Vec::new(),
            enable_global_instead_of: false,
            nested_submodules: true,
            pipeline_id: String::new(),
            job_id: String::new(),
            task_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_mask_secrets_in_debug() {
        let auth = AuthInfo::with_password("oauth2", "super-secret");
        let out = format!("{auth:?}");
        assert!(out.contains("oauth2"));
        assert!(!out.contains("super-secret"));
        assert!(out.contains("***"));
    }

    #[test]
    fn test_should_detect_basic_auth() {
        assert!(AuthInfo::with_password("user", "pass").has_basic_auth());
        assert!(!AuthInfo::with_password("user", "  ").has_basic_auth());
        assert!(!AuthInfo::default().has_basic_auth());
    }

    #[test]
    fn test_should_detect_private_key() {
        let auth = AuthInfo::with_private_key("-----BEGIN KEY-----", None);
        assert!(auth.has_private_key());
        assert!(!AuthInfo::with_private_key("   ", None).has_private_key());
    }

    #[test]
    fn test_should_build_default_settings() {
        let settings = CheckoutSettings::new("https://git.example.com/a/b.git", "/data/ws");
        assert!(settings.nested_submodules);
        assert!(!settings.enable_global_instead_of);
        assert!(settings.compatible_hosts.is_empty());
    }
}
