//! Strategy selection.
//!
//! The decision itself is a pure function of four observable facts, kept
//! free of git calls so the whole table can be tested directly. The async
//! wrappers gather those facts and instantiate the strategy.

use tracing::info;

use gco_core::settings::CheckoutSettings;
use gco_git::version::SUPPORT_CRED_HELPER;
use gco_git::{ConfigScope, GitClient, GitVersion, ServerInfo};

use crate::errors::AuthError;
use crate::strategy::AuthStrategy;
use crate::types::{AUTH_HELPER_KEY, AuthHelperType, CREDENTIAL_HELPER_KEY, HELPER_SIGNATURE};

/// Decide which mechanism fits the remote and the agent's git.
///
/// SSH remotes always use the agent strategy. Ancient gits without
/// credential-helper support fall back to URL-embedded credentials. The
/// custom helper is preferred, but only when it would not fight a
/// user-configured global helper and a home directory exists for its
/// store; otherwise askpass.
pub fn select_helper_type(
    server: &ServerInfo,
    git_version: GitVersion,
    global_helpers: &[String],
    home_is_set: bool,
) -> AuthHelperType {
    if !server.http_protocol {
        return AuthHelperType::Ssh;
    }
    if !git_version.is_at_least(SUPPORT_CRED_HELPER) {
        return AuthHelperType::UsernamePassword;
    }
    let helper_compatible = global_helpers.is_empty()
        || global_helpers.iter().any(|h| h.contains(HELPER_SIGNATURE));
    if helper_compatible && home_is_set {
        AuthHelperType::CustomCredential
    } else {
        AuthHelperType::AskPass
    }
}

/// Select and build the strategy for a configure pass.
///
/// # Errors
///
/// Fails when the repository URL cannot be parsed or git cannot be probed.
pub async fn select(
    git: &mut GitClient,
    settings: &CheckoutSettings,
) -> Result<AuthStrategy, AuthError> {
    let server = ServerInfo::parse(&settings.repository_url)?;
    let version = git.version().await?;
    let global_helpers = git
        .try_config_get_all(CREDENTIAL_HELPER_KEY, ConfigScope::Global)
        .await?;
    let home_is_set = std::env::var(gco_core::agent::HOME).is_ok_and(|v| !v.is_empty());

    let kind = select_helper_type(&server, version, &global_helpers, home_is_set);
    info!("selected auth helper {kind} for {}", server.origin);
    Ok(AuthStrategy::new(kind, settings.clone(), server))
}

/// Reconstruct the strategy a previous configure pass recorded.
///
/// Cleanup may run in a fresh process after the environment changed, so
/// the persisted marker wins over re-deriving the decision; without a
/// marker the regular selection applies.
///
/// # Errors
///
/// Fails when neither path can produce a strategy.
pub async fn select_for_cleanup(
    git: &mut GitClient,
    settings: &CheckoutSettings,
) -> Result<AuthStrategy, AuthError> {
    if let Some(marker) = git.try_config_get(AUTH_HELPER_KEY).await?
        && let Some(kind) = AuthHelperType::from_config_value(&marker)
    {
        let server = ServerInfo::parse(&settings.repository_url)?;
        info!("cleaning up previously configured auth helper {kind}");
        return Ok(AuthStrategy::new(kind, settings.clone(), server));
    }
    select(git, settings).await
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn server(url: &str) -> ServerInfo {
        ServerInfo::parse(url).unwrap()
    }

    fn helpers(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    const MODERN: GitVersion = GitVersion::new(2, 39, 2);

    #[rstest]
    #[case::ssh_remote(
        "git@git.example.com:a/b.git", MODERN, &[], true, AuthHelperType::Ssh
    )]
    #[case::ssh_remote_ignores_missing_home(
        "ssh://git@git.example.com/a/b.git", MODERN, &[], false, AuthHelperType::Ssh
    )]
    #[case::ancient_git(
        "https://git.example.com/a/b.git",
        GitVersion::new(1, 7, 9),
        &[],
        true,
        AuthHelperType::UsernamePassword
    )]
    #[case::no_global_helper(
        "https://git.example.com/a/b.git", MODERN, &[], true, AuthHelperType::CustomCredential
    )]
    #[case::own_helper_already_registered(
        "https://git.example.com/a/b.git",
        MODERN,
        &["!'/data/.checkout/gco-credential-1.0.0' credential"],
        true,
        AuthHelperType::CustomCredential
    )]
    #[case::foreign_helper(
        "https://git.example.com/a/b.git",
        MODERN,
        &["osxkeychain"],
        true,
        AuthHelperType::AskPass
    )]
    #[case::no_home(
        "https://git.example.com/a/b.git", MODERN, &[], false, AuthHelperType::AskPass
    )]
    #[case::foreign_helper_and_no_home(
        "https://git.example.com/a/b.git",
        MODERN,
        &["cache --timeout=300"],
        false,
        AuthHelperType::AskPass
    )]
    fn test_should_select_helper_type(
        #[case] url: &str,
        #[case] version: GitVersion,
        #[case] global_helpers: &[&str],
        #[case] home_is_set: bool,
        #[case] expected: AuthHelperType,
    ) {
        assert_eq!(
            select_helper_type(&server(url), version, &helpers(global_helpers), home_is_set),
            expected
        );
    }

    #[test]
    fn test_should_prefer_cred_helper_exactly_at_threshold() {
        let kind = select_helper_type(
            &server("https://git.example.com/a/b.git"),
            GitVersion::new(1, 7, 10),
            &[],
            true,
        );
        assert_eq!(kind, AuthHelperType::CustomCredential);
    }
}
