//! File-backed credential store used by the installed custom helper.
//!
//! Credentials are keyed by pseudo-URIs under a reserved invalid domain so
//! they can never collide with a real remote. The shared key serves every
//! task on the agent; per-task keys let concurrent jobs with different
//! tokens coexist.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

const SHARED_URI: &str = "https://git-credential.gco.invalid";
const STORE_DIR: &str = ".checkout";
const STORE_FILE: &str = "credentials.json";

/// Pseudo-URI for the shared (most recent) credential.
pub fn shared_uri() -> String {
    SHARED_URI.to_string()
}

/// Pseudo-URI keying a single task's credential.
pub fn task_uri(task_id: &str) -> String {
    format!("https://{task_id}.git-credential.gco.invalid")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredCredential {
    username: String,
    password: String,
}

/// The on-disk credential map.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredCredential>,
}

impl CredentialStore {
    /// Open (or create empty) the store at `path`.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or syntactically broken store files.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| AuthError::Store(e.to_string()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Open the store at its default location under the real home.
    ///
    /// # Errors
    ///
    /// Fails when no home directory can be determined.
    pub fn open_default() -> Result<Self, AuthError> {
        Self::open(Self::default_path()?)
    }

    /// `~/.checkout/credentials.json`.
    ///
    /// # Errors
    ///
    /// Fails when no home directory can be determined.
    pub fn default_path() -> Result<PathBuf, AuthError> {
        let home = dirs::home_dir()
            .ok_or_else(|| AuthError::Store("no home directory for credential store".to_string()))?;
        Ok(home.join(STORE_DIR).join(STORE_FILE))
    }

    /// Location backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the credential under `uri`.
    pub fn store(&mut self, uri: &str, username: &str, password: &str) {
        self.entries.insert(
            uri.to_string(),
            StoredCredential {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
    }

    /// Look up one key.
    pub fn get(&self, uri: &str) -> Option<(&str, &str)> {
        self.entries
            .get(uri)
            .map(|c| (c.username.as_str(), c.password.as_str()))
    }

    /// Task-scoped lookup falling back to the shared credential.
    pub fn lookup(&self, task_id: Option<&str>) -> Option<(&str, &str)> {
        task_id
            .and_then(|id| self.get(&task_uri(id)))
            .or_else(|| self.get(SHARED_URI))
    }

    /// Remove one key; true when something was removed.
    pub fn erase(&mut self, uri: &str) -> bool {
        self.entries.remove(uri).is_some()
    }

    /// Persist the map, creating parent directories and restricting the
    /// file to the owning user.
    ///
    /// # Errors
    ///
    /// Fails on any filesystem error.
    pub fn save(&self) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| AuthError::Store(e.to_string()))?;
        fs::write(&self.path, raw)?;
        restrict_to_owner(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_should_build_pseudo_uris() {
        assert_eq!(shared_uri(), "https://git-credential.gco.invalid");
        assert_eq!(task_uri("t-42"), "https://t-42.git-credential.gco.invalid");
    }

    #[test]
    fn test_should_round_trip_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let mut store = CredentialStore::open(&path).unwrap();
        store.store(&shared_uri(), "oauth2", "tok-1");
        store.store(&task_uri("t-1"), "user", "tok-2");
        store.save().unwrap();

        let reopened = CredentialStore::open(&path).unwrap();
        assert_eq!(reopened.get(&shared_uri()), Some(("oauth2", "tok-1")));
        assert_eq!(reopened.get(&task_uri("t-1")), Some(("user", "tok-2")));
    }

    #[test]
    fn test_should_prefer_task_credential() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::open(dir.path().join("c.json")).unwrap();
        store.store(&shared_uri(), "shared", "s");
        store.store(&task_uri("t-1"), "task", "t");

        assert_eq!(store.lookup(Some("t-1")), Some(("task", "t")));
        assert_eq!(store.lookup(Some("t-2")), Some(("shared", "s")));
        assert_eq!(store.lookup(None), Some(("shared", "s")));
    }

    #[test]
    fn test_should_erase_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::open(dir.path().join("c.json")).unwrap();
        store.store(&shared_uri(), "u", "p");
        assert!(store.erase(&shared_uri()));
        assert!(!store.erase(&shared_uri()));
        assert!(store.lookup(None).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_should_restrict_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut store = CredentialStore::open(&path).unwrap();
        store.store(&shared_uri(), "u", "p");
        store.save().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_should_reject_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, "not json").unwrap();
        assert!(CredentialStore::open(&path).is_err());
    }
}
