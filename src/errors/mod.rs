//! # Error Handling
//!
//! Each component reports its own `thiserror` enum. This module aggregates
//! them into one [`Error`] for code that crosses component boundaries.

use crate::activation::FailureReason;
use crate::broker::BrokerError;
use crate::credentials::DecodeError;
use crate::guard::CleanupError;
use crate::issuer::IssueError;
use crate::targets::TargetError;

/// Custom result type for credential lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the credential lifecycle
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Broker login, lookup and transport errors
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Credential issuance errors
    #[error(transparent)]
    Issue(#[from] IssueError),

    /// Broker payload did not match the credential schema
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The target system never accepted the credential
    #[error("Credential never became usable: {0}")]
    Activation(FailureReason),

    /// Target system errors outside activation and teardown
    #[error("Target system error: {0}")]
    Target(#[from] TargetError),

    /// Teardown or revocation failed after cleanup began
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Whether the broker lease may still be live and needs manual attention
    pub fn needs_manual_remediation(&self) -> bool {
        matches!(self, Self::Cleanup(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_config_error_message() {
        let err = Error::config("No Vault host specified. See --help");
        assert_eq!(err.to_string(), "Configuration error: No Vault host specified. See --help");
        assert!(!err.needs_manual_remediation());
    }

    #[test]
    fn test_broker_error_is_transparent() {
        let err: Error = BrokerError::not_found("mysql/db1/creds/readonly").into();
        assert_eq!(err.to_string(), "Nothing found at broker path 'mysql/db1/creds/readonly'");
    }

    #[test]
    fn test_activation_timeout_surfaces_elapsed() {
        let err = Error::Activation(FailureReason::Timeout {
            elapsed: Duration::from_secs(300),
            attempts: 300,
        });
        assert!(err.to_string().contains("timeout after 300.0s"));
    }
}
