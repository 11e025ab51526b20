//! Global-scope guard behavior against a real git binary.
//!
//! Runs entirely inside a faked HOME so nothing touches the build user's
//! real configuration; degrades to a no-op when git is not installed.

use gco_auth::scope::{GlobalOp, GlobalScopeGuard, RewritePlan};
use gco_core::settings::CheckoutSettings;
use gco_git::{ConfigScope, GitClient};

const REWRITE_KEY: &str = "url.https://git.example.test/.insteadOf";
const REWRITE_VALUE: &str = "git@git.example.test:";

#[tokio::test]
async fn test_should_keep_requested_global_rewrites_visible_to_the_step() {
    let home = tempfile::tempdir().expect("home dir");
    let repo = tempfile::tempdir().expect("repo dir");
    // Process-wide on purpose; this file holds a single test so nothing
    // else observes the switch.
    unsafe {
        std::env::set_var("HOME", home.path());
        std::env::remove_var("XDG_CONFIG_HOME");
        std::env::remove_var("CI_BUILD_TYPE");
    }
    let Ok(mut git) = GitClient::new(repo.path()) else {
        return;
    };

    let mut settings = CheckoutSettings::new("https://git.example.test/a/b.git", repo.path());
    settings.enable_global_instead_of = true;
    settings.pipeline_id = "p-1".to_string();
    settings.job_id = "j-1".to_string();

    let plan = RewritePlan {
        write: vec![GlobalOp::Add {
            key: REWRITE_KEY.to_string(),
            value: REWRITE_VALUE.to_string(),
        }],
        ..RewritePlan::default()
    };
    let guard = GlobalScopeGuard::enter(&mut git, &settings, false, &plan)
        .await
        .expect("enter global scope");

    // The step's own git resolves the rewrite through the overlay.
    assert_eq!(
        git.try_config_get_scoped(REWRITE_KEY, ConfigScope::Global)
            .await
            .expect("overlay get")
            .as_deref(),
        Some(REWRITE_VALUE)
    );
    // On an isolated agent it also landed in the (faked) real global scope,
    // where downstream steps of the job pick it up.
    let outside = GitClient::new(repo.path()).expect("plain client");
    assert_eq!(
        outside
            .try_config_get_scoped(REWRITE_KEY, ConfigScope::Global)
            .await
            .expect("real global get")
            .as_deref(),
        Some(REWRITE_VALUE)
    );

    let scratch = guard.scratch_home().to_path_buf();
    guard.teardown(&mut git).await;
    assert!(!scratch.exists());
    assert!(git.env_var("XDG_CONFIG_HOME").is_none());
    assert!(git.env_var("HOME").is_none());
    // Explicitly requested global rewrites survive teardown.
    assert_eq!(
        outside
            .try_config_get_scoped(REWRITE_KEY, ConfigScope::Global)
            .await
            .expect("after teardown")
            .as_deref(),
        Some(REWRITE_VALUE)
    );
}
