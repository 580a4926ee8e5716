//! # Credential Issuance
//!
//! Requests a secret from the broker and decodes it into a typed [`Lease`].
//! Kinds that take request parameters are issued through a broker write,
//! everything else through a read. Issuance never retries.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::broker::{BrokerError, Params, SecretsBroker};
use crate::credentials::{Credential, CredentialKind, DecodeError};
use crate::lease::Lease;

/// Errors from a single issuance attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    /// Nothing is configured at the path; usually a role that was never enabled.
    #[error("Role not enabled: nothing is configured at '{path}'")]
    RoleNotEnabled { path: String },

    #[error("Unexpected {kind} payload from '{path}': {source}")]
    Decode {
        path: String,
        kind: CredentialKind,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Broker(BrokerError),
}

impl From<BrokerError> for IssueError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::NotFound { path } => Self::RoleNotEnabled { path },
            other => Self::Broker(other),
        }
    }
}

/// What to issue and how to decode it.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub path: String,
    pub kind: CredentialKind,
    pub params: Option<Params>,
}

impl IssueRequest {
    pub fn new(path: impl Into<String>, kind: CredentialKind) -> Self {
        Self { path: path.into(), kind, params: None }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }
}

/// Issues leased credentials through a broker session.
#[derive(Clone)]
pub struct CredentialIssuer {
    broker: Arc<dyn SecretsBroker>,
}

impl CredentialIssuer {
    pub fn new(broker: Arc<dyn SecretsBroker>) -> Self {
        Self { broker }
    }

    #[instrument(skip(self, request), fields(path = %request.path, kind = %request.kind))]
    pub async fn issue(&self, request: IssueRequest) -> Result<Lease, IssueError> {
        let IssueRequest { path, kind, params } = request;

        let payload = match params {
            Some(params) => self.broker.write(&path, &params).await?,
            None if kind.requires_params() => self.broker.write(&path, &Params::new()).await?,
            None => self.broker.read(&path).await?,
        };

        let credential = Credential::decode(kind, &payload.data)
            .map_err(|source| IssueError::Decode { path: path.clone(), kind, source })?;

        info!(lease_id = %payload.lease_id, ttl = payload.lease_duration, "Credential issued");
        Ok(Lease::new(credential, payload.lease_id, payload.lease_duration))
    }
}
