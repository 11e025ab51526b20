//! Build agent environment probing.
//!
//! The step consumes a handful of environment variables for isolation-policy
//! decisions and cache-path namespacing. They are never business logic
//! inputs beyond that.

/// Home directory variable overridden by the global-scope guard.
pub const HOME: &str = "HOME";
/// Secondary config-home variable consulted by git >= 1.7.12.
pub const XDG_CONFIG_HOME: &str = "XDG_CONFIG_HOME";
/// Askpass program override consumed by git.
pub const GIT_ASKPASS: &str = "GIT_ASKPASS";
/// SSH command override consumed by git.
pub const GIT_SSH_COMMAND: &str = "GIT_SSH_COMMAND";

/// Pipeline identifier, used for scratch-path namespacing.
pub const CI_PIPELINE_ID: &str = "CI_PIPELINE_ID";
/// Job identifier, used for scratch-path namespacing.
pub const CI_BUILD_JOB_ID: &str = "CI_BUILD_JOB_ID";
/// Task identifier, used to key per-task credentials.
pub const CI_BUILD_TASK_ID: &str = "CI_BUILD_TASK_ID";
/// Set to `AGENT` on shared third-party build machines.
pub const CI_BUILD_TYPE: &str = "CI_BUILD_TYPE";
/// Marks long-lived container agents that survive between builds.
pub const CI_SLAVE_ENVIRONMENT: &str = "CI_SLAVE_ENVIRONMENT";

/// Operating system flavor, as far as script generation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    /// Unix-likes get `#!/bin/sh` askpass scripts.
    Unix,
    /// Windows gets batch askpass scripts.
    Windows,
}

/// Detect the OS flavor of the current agent.
pub fn os_kind() -> OsKind {
    if cfg!(windows) {
        OsKind::Windows
    } else {
        OsKind::Unix
    }
}

/// Whether the step runs on a shared third-party agent.
///
/// Third-party agents host unrelated pipelines concurrently, so global git
/// configuration must never be touched there.
pub fn is_third_party() -> bool {
    std::env::var(CI_BUILD_TYPE).is_ok_and(|v| v == "AGENT")
}

/// Whether the agent is a long-lived container that persists between builds.
pub fn is_persistent_container() -> bool {
    std::env::var(CI_SLAVE_ENVIRONMENT).is_ok_and(|v| v == "devcloud")
}

/// Whether the agent is a fully isolated build environment.
///
/// Isolated agents are the only place where writing rewrites into the real
/// global git scope is acceptable.
pub fn is_isolated() -> bool {
    is_persistent_container() || !is_third_party()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_detect_os_kind() {
        let kind = os_kind();
        if cfg!(windows) {
            assert_eq!(kind, OsKind::Windows);
        } else {
            assert_eq!(kind, OsKind::Unix);
        }
    }

    #[test]
    fn test_should_expose_env_names() {
        // These names are part of the pipeline contract; lock them down.
        assert_eq!(HOME, "HOME");
        assert_eq!(XDG_CONFIG_HOME, "XDG_CONFIG_HOME");
        assert_eq!(CI_BUILD_TASK_ID, "CI_BUILD_TASK_ID");
    }
}
