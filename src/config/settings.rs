//! # Configuration Settings
//!
//! Per-invocation settings for the broker connection and the retry bounds used
//! while waiting on target systems. Built once from flags, the config file and
//! the environment, then passed by value and never mutated.

use crate::activation::RetryPolicy;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Connection settings for the secrets broker.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BrokerConfig {
    /// Full broker URL (e.g. from `VAULT_ADDR`). Takes precedence over host/port.
    pub address: Option<String>,

    /// Broker host name
    pub host: String,

    /// Broker port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// URL scheme used with host/port
    pub scheme: String,

    /// Operator identity presented to the auth method
    #[validate(length(min = 1, message = "Username cannot be empty"))]
    pub username: String,

    /// Auth method mount (ldap, userpass, ...)
    #[validate(length(min = 1, message = "Auth method cannot be empty"))]
    pub auth_method: String,

    /// Vault Enterprise namespace
    pub namespace: Option<String>,

    /// Accept invalid TLS certificates (development only)
    pub skip_verify: bool,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: None,
            host: String::new(),
            port: 8200,
            scheme: "https".to_string(),
            username: String::new(),
            auth_method: "ldap".to_string(),
            namespace: None,
            skip_verify: false,
            timeout_seconds: 30,
        }
    }
}

impl BrokerConfig {
    /// Base URL requests are sent to.
    pub fn endpoint(&self) -> String {
        match &self.address {
            Some(address) if !address.is_empty() => address.trim_end_matches('/').to_string(),
            _ => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }

    /// Validate field rules and the values spliced into the login path.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| Error::config(e.to_string()))?;

        let has_address = self.address.as_deref().is_some_and(|a| !a.is_empty());
        if !has_address && self.host.is_empty() {
            return Err(Error::config("No Vault host specified. See --help"));
        }

        validate_path_component(&self.username, "username")?;
        validate_path_component(&self.auth_method, "auth method")?;

        Ok(())
    }
}

/// Rejects values that would change the shape of a broker path they are spliced into.
///
/// ```rust,ignore
/// validate_path_component("oncall", "username")?;       // OK
/// validate_path_component("../sys/raw", "username")?;   // Error: contains '/'
/// ```
pub fn validate_path_component(component: &str, name: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::config(format!("{} cannot be empty", name)));
    }

    if component.contains('/') {
        return Err(Error::config(format!("{} cannot contain '/' (path separator)", name)));
    }

    if component.contains("..") {
        return Err(Error::config(format!("{} cannot contain '..' (path traversal)", name)));
    }

    if component.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::config(format!("{} cannot contain whitespace", name)));
    }

    Ok(())
}

/// Retry bounds for the two waits in a session.
///
/// `None` for a max wait means wait indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Delay between activation probes in milliseconds
    pub activation_interval_ms: u64,

    /// Give up waiting for propagation after this many seconds
    pub activation_max_wait_secs: Option<u64>,

    /// Delay between teardown attempts in milliseconds
    pub teardown_interval_ms: u64,

    /// Give up tearing down a secondary resource after this many seconds
    pub teardown_max_wait_secs: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            activation_interval_ms: 1000,
            activation_max_wait_secs: Some(300),
            teardown_interval_ms: 1000,
            teardown_max_wait_secs: Some(120),
        }
    }
}

impl SessionSettings {
    pub fn activation_policy(&self) -> RetryPolicy {
        policy(self.activation_interval_ms, self.activation_max_wait_secs)
    }

    pub fn teardown_policy(&self) -> RetryPolicy {
        policy(self.teardown_interval_ms, self.teardown_max_wait_secs)
    }
}

fn policy(interval_ms: u64, max_wait_secs: Option<u64>) -> RetryPolicy {
    let interval = Duration::from_millis(interval_ms.max(1));
    match max_wait_secs {
        Some(0) | None => RetryPolicy::unbounded(interval),
        Some(secs) => RetryPolicy::bounded(interval, Duration::from_secs(secs)),
    }
}
