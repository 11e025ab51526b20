//! Git command wrapper, URL resolution and submodule enumeration for gco.

pub mod client;
pub mod errors;
pub mod server_info;
pub mod submodule;
pub mod version;

pub use client::{ConfigScope, CredentialAction, GitClient};
pub use errors::GitError;
pub use server_info::ServerInfo;
pub use version::GitVersion;
