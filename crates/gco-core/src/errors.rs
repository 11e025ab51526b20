//! Core error types for the checkout step.

/// Errors originating from core operations.
///
/// Only [`CoreError::ParamInvalid`] is build-breaking; everything else is
/// expected to degrade to a warning at the call site.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A required parameter or secret is missing or malformed.
    #[error("invalid parameter: {0}")]
    ParamInvalid(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(String),

    /// A required value was not found.
    #[error("{0}")]
    NotFound(String),
}

impl CoreError {
    /// Shortcut for building a `ParamInvalid` error.
    pub fn param_invalid(msg: impl Into<String>) -> Self {
        Self::ParamInvalid(msg.into())
    }

    /// Whether this error must abort the whole step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ParamInvalid(_))
    }
}
