//! Leases pair an issued credential with the broker identifier that revokes it.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::broker::{Ack, BrokerError, SecretsBroker};
use crate::credentials::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Active,
    Revoked,
}

/// An issued credential and its broker lease.
///
/// The lease identifier never changes. `Active -> Revoked` is one-way; once
/// revoked, further revocations are acknowledged without contacting the broker.
#[derive(Debug)]
pub struct Lease {
    credential: Credential,
    lease_id: String,
    lease_duration: u64,
    revoked: AtomicBool,
}

impl Lease {
    pub fn new(credential: Credential, lease_id: String, lease_duration: u64) -> Self {
        Self { credential, lease_id, lease_duration, revoked: AtomicBool::new(false) }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn lease_id(&self) -> &str {
        &self.lease_id
    }

    /// Lease TTL in seconds as granted by the broker.
    pub fn lease_duration(&self) -> u64 {
        self.lease_duration
    }

    pub fn state(&self) -> LeaseState {
        if self.revoked.load(Ordering::Acquire) {
            LeaseState::Revoked
        } else {
            LeaseState::Active
        }
    }

    /// Revoke through `broker`. Idempotent.
    pub async fn revoke(&self, broker: &dyn SecretsBroker) -> Result<Ack, BrokerError> {
        if self.state() == LeaseState::Revoked {
            return Ok(Ack);
        }

        let ack = broker.revoke(&self.lease_id).await?;
        self.revoked.store(true, Ordering::Release);
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Params, SecretPayload};
    use crate::credentials::CredentialKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingBroker {
        revocations: AtomicUsize,
    }

    #[async_trait]
    impl SecretsBroker for CountingBroker {
        async fn read(&self, path: &str) -> crate::broker::Result<SecretPayload> {
            Err(BrokerError::not_found(path))
        }

        async fn write(&self, path: &str, _params: &Params) -> crate::broker::Result<SecretPayload> {
            Err(BrokerError::not_found(path))
        }

        async fn revoke(&self, _lease_id: &str) -> crate::broker::Result<Ack> {
            self.revocations.fetch_add(1, Ordering::SeqCst);
            Ok(Ack)
        }
    }

    fn database_lease() -> Lease {
        let data = json!({"username": "u", "password": "p"});
        let credential =
            Credential::decode(CredentialKind::DatabaseLogin, data.as_object().unwrap()).unwrap();
        Lease::new(credential, "mysql/db1/creds/readonly/abc".to_string(), 3600)
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let broker = CountingBroker::default();
        let lease = database_lease();
        assert_eq!(lease.state(), LeaseState::Active);

        lease.revoke(&broker).await.unwrap();
        lease.revoke(&broker).await.unwrap();

        assert_eq!(lease.state(), LeaseState::Revoked);
        assert_eq!(broker.revocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lease_exposes_broker_metadata() {
        let lease = database_lease();
        assert_eq!(lease.lease_id(), "mysql/db1/creds/readonly/abc");
        assert_eq!(lease.lease_duration(), 3600);
        assert_eq!(lease.credential().kind(), CredentialKind::DatabaseLogin);
    }
}
