//! Submodule enumeration and `git submodule status` parsing.
//!
//! The auth core re-enumerates the submodule tree on every configure/remove
//! pass; trees can change between pipeline steps, so results are never
//! cached.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::client::GitClient;
use crate::errors::GitError;

static SUBMODULE_URL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^submodule\.(.+)\.url$").expect("valid regex"));

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-+U]?([0-9a-fA-F]{7,40})\s+(.*?)(?:\s+\((.*)\))?\s*$").expect("valid regex")
});

/// A submodule declared in `.gitmodules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Name of the `.gitmodules` section.
    pub name: String,
    /// Path relative to the declaring repository.
    pub path: String,
    /// Absolute working directory of the submodule.
    pub absolute_path: PathBuf,
    /// Remote URL as declared.
    pub url: String,
}

/// One line of `git submodule status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleStatus {
    /// Checked-out commit.
    pub commit_id: String,
    /// Submodule path (may contain spaces and non-ASCII).
    pub path: String,
    /// `git describe` suffix, empty when absent.
    pub ref_name: String,
}

/// Enumerate submodules declared under `repository_dir`, optionally
/// recursing into nested trees.
///
/// Repositories without a `.gitmodules` yield an empty list; enumeration
/// failures inside a nested tree are logged and skipped so one broken
/// submodule cannot hide its siblings.
pub async fn list_submodules(
    git: &GitClient,
    repository_dir: &Path,
    recursive: bool,
) -> Vec<Submodule> {
    let entries = match try_get_regexp_in(git, repository_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("skipping submodule enumeration in {repository_dir:?}: {e}");
            return Vec::new();
        }
    };

    let mut submodules = Vec::new();
    for (key, url) in entries {
        let Some(caps) = SUBMODULE_URL_KEY.captures(&key) else {
            continue;
        };
        let name = caps[1].to_string();
        let path_key = format!("submodule.{name}.path");
        let path = match git
            .run_in_dir(repository_dir, &["config", "-f", ".gitmodules", "--get", &path_key])
            .await
        {
            Ok(p) if !p.is_empty() => p,
            _ => {
                debug!("submodule {name} has no path entry, skipping");
                continue;
            }
        };
        let absolute_path = repository_dir.join(&path);
        if recursive {
            submodules
                .extend(Box::pin(list_submodules(git, &absolute_path, recursive)).await);
        }
        submodules.push(Submodule {
            name,
            path,
            absolute_path,
            url,
        });
    }
    submodules
}

async fn try_get_regexp_in(
    git: &GitClient,
    dir: &Path,
) -> Result<Vec<(String, String)>, GitError> {
    if !dir.join(".gitmodules").exists() {
        return Ok(Vec::new());
    }
    let args = [
        "config",
        "-f",
        ".gitmodules",
        "--get-regexp",
        r"^submodule\..*\.url$",
    ];
    match git.run_in_dir(dir, &args).await {
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

/// Parse one `git submodule status` line.
///
/// Handles the leading state marker (`-`, `+`, `U`), paths with embedded
/// spaces, and empty or absent describe suffixes.
pub fn parse_status_line(line: &str) -> Option<SubmoduleStatus> {
    let caps = STATUS_LINE.captures(line)?;
    let path = caps[2].trim().to_string();
    if path.is_empty() {
        return None;
    }
    Some(SubmoduleStatus {
        commit_id: caps[1].to_string(),
        path,
        ref_name: caps.get(3).map_or(String::new(), |m| m.as_str().to_string()),
    })
}

/// Parse full `git submodule status` output.
pub fn parse_status(output: &str) -> Vec<SubmoduleStatus> {
    output.lines().filter_map(parse_status_line).collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn status(commit_id: &str, path: &str, ref_name: &str) -> SubmoduleStatus {
        SubmoduleStatus {
            commit_id: commit_id.to_string(),
            path: path.to_string(),
            ref_name: ref_name.to_string(),
        }
    }

    #[rstest]
    #[case(
        "-e742bf800a18bdb61037357a1074e63057679913 services/worker",
        status("e742bf800a18bdb61037357a1074e63057679913", "services/worker", "")
    )]
    #[case(
        " 45f22503588f74fea7e54f2462e8f95d827fcaaf ../sibling/HelloWorlds_HJ (v1.100.1.0-55-g45f2250)",
        status(
            "45f22503588f74fea7e54f2462e8f95d827fcaaf",
            "../sibling/HelloWorlds_HJ",
            "v1.100.1.0-55-g45f2250"
        )
    )]
    #[case(
        " 32651f57c27039e143a128f2b05403436f86ce74 tools/checkout ",
        status("32651f57c27039e143a128f2b05403436f86ce74", "tools/checkout", "")
    )]
    #[case(
        " 32651f57c27039e143a128f2b05403436f86ce74 tools/checkout ()",
        status("32651f57c27039e143a128f2b05403436f86ce74", "tools/checkout", "")
    )]
    #[case(
        " 32651f57c27039e143a128f2b05403436f86ce74 path with space dir/checkout (1.1.27-2024-01-12)",
        status(
            "32651f57c27039e143a128f2b05403436f86ce74",
            "path with space dir/checkout",
            "1.1.27-2024-01-12"
        )
    )]
    #[case(
        " 32651f57c27039e143a128f2b05403436f86ce74 module 代码 dir/checkout ()",
        status("32651f57c27039e143a128f2b05403436f86ce74", "module 代码 dir/checkout", "")
    )]
    fn test_should_parse_status_line(#[case] line: &str, #[case] expected: SubmoduleStatus) {
        assert_eq!(parse_status_line(line).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("not a status line")]
    #[case("deadbeef")]
    fn test_should_reject_malformed_status_line(#[case] line: &str) {
        assert!(parse_status_line(line).is_none());
    }

    #[test]
    fn test_should_parse_multiple_status_lines() {
        let output = "-e742bf800a18bdb61037357a1074e63057679913 a\n\
                       45f22503588f74fea7e54f2462e8f95d827fcaaf b (v1.0)";
        let statuses = parse_status(output);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].path, "a");
        assert_eq!(statuses[1].ref_name, "v1.0");
    }
}
