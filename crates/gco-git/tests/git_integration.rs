//! Integration tests against a real git binary.
//!
//! Every test degrades to a no-op when git is not installed, so the suite
//! stays runnable on minimal build images.

use gco_git::{ConfigScope, GitClient};

async fn init_repo() -> Option<(tempfile::TempDir, GitClient)> {
    let dir = tempfile::tempdir().expect("tempdir");
    let git = GitClient::new(dir.path()).ok()?;
    git.run(&["init"]).await.ok()?;
    Some((dir, git))
}

#[tokio::test]
async fn test_should_probe_git_version() {
    let Some((_dir, mut git)) = init_repo().await else {
        return;
    };
    let version = git.version().await.expect("version probe");
    assert!(version.major >= 1);
    // Second call hits the cache and agrees.
    assert_eq!(git.version().await.expect("cached probe"), version);
}

#[tokio::test]
async fn test_should_round_trip_local_config() {
    let Some((_dir, git)) = init_repo().await else {
        return;
    };
    git.config_set("gco.test", "value-1", ConfigScope::Local)
        .await
        .expect("config set");
    assert_eq!(
        git.try_config_get("gco.test").await.expect("config get").as_deref(),
        Some("value-1")
    );

    git.try_config_unset("gco.test", ConfigScope::Local)
        .await
        .expect("config unset");
    assert_eq!(git.try_config_get("gco.test").await.expect("after unset"), None);
    // Unsetting again is not an error.
    git.try_config_unset("gco.test", ConfigScope::Local)
        .await
        .expect("idempotent unset");
}

#[tokio::test]
async fn test_should_handle_multi_valued_keys() {
    let Some((_dir, git)) = init_repo().await else {
        return;
    };
    git.config_add("gco.multi", "a", ConfigScope::Local).await.expect("add a");
    git.config_add("gco.multi", "b", ConfigScope::Local).await.expect("add b");
    assert_eq!(
        git.try_config_get_all("gco.multi", ConfigScope::Local).await.expect("get all"),
        vec!["a".to_string(), "b".to_string()]
    );

    let pairs = git
        .try_config_get_regexp("^gco\\.multi$", ConfigScope::Local)
        .await
        .expect("get regexp");
    assert_eq!(pairs.len(), 2);
    assert!(pairs.iter().all(|(k, _)| k == "gco.multi"));

    git.try_config_unset_all("gco.multi", ConfigScope::Local)
        .await
        .expect("unset all");
    assert!(
        git.try_config_get_all("gco.multi", ConfigScope::Local)
            .await
            .expect("empty after unset")
            .is_empty()
    );
}

#[tokio::test]
async fn test_should_redirect_global_scope_through_env_overlay() {
    let Some((_dir, mut git)) = init_repo().await else {
        return;
    };
    let home = tempfile::tempdir().expect("scratch home");
    git.set_env("HOME", home.path().display().to_string());

    git.config_set("gco.scoped", "scratch", ConfigScope::Global)
        .await
        .expect("global set under overlay");
    assert!(home.path().join(".gitconfig").exists());
    assert_eq!(
        git.try_config_get_scoped("gco.scoped", ConfigScope::Global)
            .await
            .expect("global get")
            .as_deref(),
        Some("scratch")
    );

    git.remove_env("HOME");
}

#[tokio::test]
async fn test_should_remove_sections_quietly() {
    let Some((_dir, git)) = init_repo().await else {
        return;
    };
    git.config_set("url.https://git.example.com/.insteadOf", "git@git.example.com:", ConfigScope::Local)
        .await
        .expect("instead of");
    git.try_remove_section("url.https://git.example.com/", ConfigScope::Local)
        .await
        .expect("remove section");
    assert_eq!(
        git.try_config_get("url.https://git.example.com/.insteadOf")
            .await
            .expect("gone"),
        None
    );
    // Missing section is swallowed.
    git.try_remove_section("url.https://missing.example.com/", ConfigScope::Local)
        .await
        .expect("missing section ok");
}

#[tokio::test]
async fn test_should_report_remote_urls() {
    let Some((_dir, git)) = init_repo().await else {
        return;
    };
    git.run(&["remote", "add", "origin", "https://git.example.com/a/b.git"])
        .await
        .expect("remote add");
    git.remote_set_url("origin", "https://git.example.com/a/c.git")
        .await
        .expect("set url");
    let url = git.run(&["remote", "get-url", "origin"]).await.expect("get url");
    assert_eq!(url, "https://git.example.com/a/c.git");
}
