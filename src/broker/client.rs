//! Broker trait and response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::Result;

/// Request parameters for parameterized issuance (SSH, PKI).
pub type Params = Map<String, Value>;

/// A secret returned by the broker, together with the lease that tracks it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretPayload {
    /// Raw secret fields. Decoded into a typed credential by the issuer.
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Lease identifier; empty when the secret is not leased.
    #[serde(default)]
    pub lease_id: String,

    /// Lease TTL in seconds.
    #[serde(default)]
    pub lease_duration: u64,

    #[serde(default)]
    pub renewable: bool,
}

/// Acknowledgement of a revoke. Returned for known, unknown and already-revoked leases alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Operations a secrets broker session offers once authenticated.
///
/// Implementations must not retry: a failed call is returned to the caller,
/// which decides whether the condition is transient.
///
/// # Security
///
/// Implementations MUST NOT log secret payload values or the session token.
#[async_trait]
pub trait SecretsBroker: Send + Sync {
    /// Fetch the secret at `path`.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::NotFound`](super::BrokerError::NotFound) if nothing is configured there
    /// - [`BrokerError::Transport`](super::BrokerError::Transport) on network or broker failure
    async fn read(&self, path: &str) -> Result<SecretPayload>;

    /// Issue a secret that needs request parameters.
    async fn write(&self, path: &str, params: &Params) -> Result<SecretPayload>;

    /// Revoke a lease. Unknown or already-revoked leases are acknowledged.
    async fn revoke(&self, lease_id: &str) -> Result<Ack>;
}
