//! Git version parsing and the feature thresholds the auth core cares about.

use crate::errors::GitError;

/// First git version with credential-helper support.
pub const SUPPORT_CRED_HELPER: GitVersion = GitVersion::new(1, 7, 10);
/// First git version reading `$XDG_CONFIG_HOME/git/config`.
pub const SUPPORT_XDG_CONFIG_HOME: GitVersion = GitVersion::new(1, 7, 12);
/// First git version honoring an empty `credential.helper` entry as
/// "drop all previously configured helpers".
pub const SUPPORT_EMPTY_CRED_HELPER: GitVersion = GitVersion::new(2, 9, 0);

/// A parsed `git --version` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl GitVersion {
    /// Build a version triple.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `git version 2.39.2.windows.1` style output.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::InvalidVersion`] when no `major.minor[.patch]`
    /// triple can be found.
    pub fn parse(output: &str) -> Result<Self, GitError> {
        let raw = output
            .trim()
            .strip_prefix("git version ")
            .unwrap_or_else(|| output.trim());

        let mut parts = raw.split('.');
        let major = parse_component(parts.next())?;
        let minor = parse_component(parts.next())?;
        // Patch is optional ("git version 2.40" appears in the wild) and
        // platform suffixes like `windows.1` are ignored.
        let patch = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(0);

        Ok(Self::new(major, minor, patch))
    }

    /// Whether this version is at least `other`.
    pub fn is_at_least(&self, other: Self) -> bool {
        *self >= other
    }
}

impl std::fmt::Display for GitVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn parse_component(part: Option<&str>) -> Result<u32, GitError> {
    part.and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(|| GitError::InvalidVersion(part.unwrap_or("").to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("git version 2.39.2", GitVersion::new(2, 39, 2))]
    #[case("git version 2.39.2.windows.1", GitVersion::new(2, 39, 2))]
    #[case("git version 1.7.10", GitVersion::new(1, 7, 10))]
    #[case("git version 2.40", GitVersion::new(2, 40, 0))]
    #[case("2.9.0", GitVersion::new(2, 9, 0))]
    fn test_should_parse_version(#[case] input: &str, #[case] expected: GitVersion) {
        assert_eq!(GitVersion::parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("git version")]
    #[case("not a version")]
    fn test_should_reject_garbage(#[case] input: &str) {
        assert!(GitVersion::parse(input).is_err());
    }

    #[test]
    fn test_should_order_versions() {
        assert!(GitVersion::new(2, 9, 0).is_at_least(SUPPORT_CRED_HELPER));
        assert!(GitVersion::new(1, 7, 10).is_at_least(SUPPORT_CRED_HELPER));
        assert!(!GitVersion::new(1, 7, 9).is_at_least(SUPPORT_CRED_HELPER));
        assert!(!GitVersion::new(1, 7, 11).is_at_least(SUPPORT_XDG_CONFIG_HOME));
        assert!(GitVersion::new(2, 30, 1).is_at_least(SUPPORT_EMPTY_CRED_HELPER));
    }

    #[test]
    fn test_should_display_version() {
        assert_eq!(GitVersion::new(2, 39, 2).to_string(), "2.39.2");
    }
}
