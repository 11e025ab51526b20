//! Core types, settings, and utilities for the gco checkout step.
//!
//! This crate provides the foundational pieces shared by the git layer and
//! the authentication core:
//! - [`CheckoutSettings`] and [`AuthInfo`] for step configuration
//! - [`CoreError`] for the fatal/degradable error split
//! - agent environment probing (shared vs isolated build machines)
//! - credential redaction for persisted log lines

pub mod agent;
pub mod errors;
pub mod redact;
pub mod settings;

pub use errors::CoreError;
pub use settings::{AuthInfo, CheckoutSettings};
