//! Target systems an issued credential is used against.
//!
//! Every target call reports failure as a [`TargetError`] carrying the
//! system's own error code, which is what the activation and teardown
//! classifiers match on.

pub mod aws;
pub mod shell;

/// An error returned by a target system, keyed by its error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TargetError {
    pub code: String,
    pub message: String,
}

impl TargetError {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    /// Network-level failure before the target produced a response.
    pub fn transport<M: Into<String>>(message: M) -> Self {
        Self::new("Transport", message)
    }
}
