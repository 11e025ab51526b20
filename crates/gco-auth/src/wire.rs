//! The `git credential` wire format.
//!
//! `key=value` lines terminated by a blank line, as produced and consumed
//! by `git credential fill/approve/reject` and by helpers on stdin/stdout.

use std::io::BufRead;

use crate::errors::AuthError;

/// One credential record on the helper wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    /// `https` or `http`.
    pub protocol: String,
    /// Host (and optional port) the credential addresses.
    pub host: String,
    /// Repository path, when git passes one through.
    pub path: Option<String>,
    /// Account name.
    pub username: Option<String>,
    /// Secret; never logged, only ever written to a helper pipe.
    pub password: Option<String>,
}

impl CredentialRecord {
    /// Record addressing a `protocol://host` pair, no credentials.
    pub fn for_host(protocol: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    /// Attach a username/password pair.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read a record from a helper's stdin.
    ///
    /// Stops at the first blank line or EOF. Lines without `=` and unknown
    /// keys are ignored, matching git's own tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Wire`] when protocol or host is missing; every
    /// helper operation needs both to address a credential.
    pub fn read_from(reader: impl BufRead) -> Result<Self, AuthError> {
        let mut record = Self::default();
        for line in reader.lines() {
            let line = line.map_err(|e| AuthError::Wire(e.to_string()))?;
            if line.is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "protocol" => record.protocol = value.to_string(),
                "host" => record.host = value.to_string(),
                "path" => record.path = Some(value.to_string()),
                "username" => record.username = Some(value.to_string()),
                "password" => record.password = Some(value.to_string()),
                _ => {}
            }
        }
        if record.protocol.trim().is_empty() || record.host.trim().is_empty() {
            return Err(AuthError::Wire(
                "credential input must carry protocol and host".to_string(),
            ));
        }
        Ok(record)
    }

    /// Serialize for feeding `git credential` or answering a `get`.
    ///
    /// Ends with the terminating blank line.
    pub fn to_wire_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("protocol={}\n", self.protocol));
        out.push_str(&format!("host={}\n", self.host));
        if let Some(path) = &self.path {
            out.push_str(&format!("path={path}\n"));
        }
        if let Some(username) = &self.username {
            out.push_str(&format!("username={username}\n"));
        }
        if let Some(password) = &self.password {
            out.push_str(&format!("password={password}\n"));
        }
        out.push('\n');
        out
    }
}
