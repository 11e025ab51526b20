//! `gco credential` command implementation.
//!
//! The git credential helper protocol endpoint behind the installed
//! helper: `get` answers from the file store, `store` is accepted and
//! ignored (the checkout step owns the store), `erase` drops the step's
//! entries. Stdout carries only protocol output.

use clap::Args;
use tracing::debug;

use gco_auth::CredentialStore;
use gco_auth::store::{shared_uri, task_uri};
use gco_auth::types::COMPATIBLE_HOST_KEY;
use gco_auth::wire::CredentialRecord;
use gco_core::agent;
use gco_git::{ConfigScope, GitClient};

/// Git credential helper protocol endpoint.
#[derive(Debug, Args)]
pub struct CredentialArgs {
    /// The helper operation: get, fill, store, or erase.
    operation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperAction {
    Get,
    Store,
    Erase,
}

fn parse_action(operation: &str) -> Option<HelperAction> {
    match operation {
        // Some git versions ask the helper to `fill`; same read path.
        "get" | "fill" => Some(HelperAction::Get),
        "store" => Some(HelperAction::Store),
        "erase" => Some(HelperAction::Erase),
        _ => None,
    }
}

impl CredentialArgs {
    /// Run the credential helper operation.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input or an unknown operation.
    pub async fn run(self) -> anyhow::Result<()> {
        match parse_action(&self.operation) {
            Some(HelperAction::Get) => handle_get().await,
            // The checkout step writes the store itself; acknowledging git's
            // post-auth store keeps the helper chain quiet.
            Some(HelperAction::Store) => Ok(()),
            Some(HelperAction::Erase) => handle_erase(),
            None => anyhow::bail!(
                "gco credential: unsupported operation {:?}",
                self.operation
            ),
        }
    }
}

async fn handle_get() -> anyhow::Result<()> {
    let record = CredentialRecord::read_from(std::io::stdin().lock())?;
    if !is_trusted_host(&record.host).await {
        debug!("host {} not covered by this agent's credentials", record.host);
        return Ok(());
    }

    let Ok(store) = CredentialStore::open_default() else {
        return Ok(());
    };
    let task_id = std::env::var(agent::CI_BUILD_TASK_ID).ok();
    if let Some((username, password)) = store.lookup(task_id.as_deref()) {
        let answer = CredentialRecord::for_host(record.protocol, record.host)
            .with_credentials(username, password);
        print!("{}", answer.to_wire_string());
    }
    Ok(())
}

fn handle_erase() -> anyhow::Result<()> {
    let Ok(mut store) = CredentialStore::open_default() else {
        return Ok(());
    };
    if let Ok(task_id) = std::env::var(agent::CI_BUILD_TASK_ID) {
        store.erase(&task_uri(&task_id));
    }
    store.erase(&shared_uri());
    store.save()?;
    Ok(())
}

/// When a compatible-host list was published to the global config, only
/// hosts on it get an answer. Without one the store itself is the filter.
async fn is_trusted_host(host: &str) -> bool {
    let Ok(git) = GitClient::new(".") else {
        return true;
    };
    match git
        .try_config_get_scoped(COMPATIBLE_HOST_KEY, ConfigScope::Global)
        .await
    {
        Ok(Some(hosts)) => hosts.split(',').any(|h| h.trim() == host),
        _ => true,
    }
}
