//! Authentication strategy core for the gco checkout step.
//!
//! Given the step settings and the agent's git, this crate decides which of
//! the five credential mechanisms to use, wires it into the repository and
//! the (isolated) global scope, sweeps submodules, and undoes everything on
//! cleanup.

mod errors;
pub mod factory;
pub mod host_set;
pub mod scope;
pub mod ssh_agent;
pub mod store;
pub mod strategy;
pub mod types;
pub mod wire;

pub use errors::AuthError;
pub use scope::GlobalScopeGuard;
pub use store::CredentialStore;
pub use strategy::AuthStrategy;
pub use types::AuthHelperType;
