//! Error types for secrets broker operations.

use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors surfaced by a [`SecretsBroker`](super::SecretsBroker).
///
/// Broker calls never retry internally, so every variant reaches the caller
/// as-is. Only the caller knows whether a failure is worth another attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker rejected the operator's credentials, or login could not reach it.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Nothing is configured at the requested path or role.
    #[error("Nothing found at broker path '{path}'")]
    NotFound { path: String },

    /// Network failure or an unexpected broker response.
    #[error("Broker request failed{}: {message}", code.as_ref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    Transport { code: Option<String>, message: String },

    /// Invalid endpoint or client settings.
    #[error("Broker configuration error: {message}")]
    Config { message: String },
}

impl BrokerError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// A transport failure without a machine-readable code (connection refused, TLS, decode).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { code: None, message: message.into() }
    }

    /// A broker-side rejection carrying the code the broker reported.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { code: Some(code.into()), message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Machine-readable code, when the broker supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transport { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        let code = err.status().map(|s| s.as_u16().to_string());
        Self::Transport { code, message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = BrokerError::not_found("mysql/db1/creds/readonly");
        assert!(matches!(err, BrokerError::NotFound { .. }));
        assert_eq!(err.to_string(), "Nothing found at broker path 'mysql/db1/creds/readonly'");

        let err = BrokerError::auth("invalid username or password");
        assert!(err.to_string().starts_with("Authentication failed"));
    }

    #[test]
    fn test_transport_display_includes_code() {
        let err = BrokerError::rejected("403", "permission denied");
        assert_eq!(err.to_string(), "Broker request failed (403): permission denied");
        assert_eq!(err.code(), Some("403"));

        let err = BrokerError::transport("connection refused");
        assert_eq!(err.to_string(), "Broker request failed: connection refused");
        assert_eq!(err.code(), None);
    }
}
