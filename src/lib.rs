//! # Breakglass
//!
//! Breakglass hands an operator short-lived credentials issued by a secrets
//! broker (HashiCorp Vault) and makes sure they are gone again when the
//! session ends.
//!
//! ## Architecture
//!
//! ```text
//! SecretsBroker ──► CredentialIssuer ──► Lease ──► ActivationPoller ──► SessionGuard
//!   (Vault)          typed decode        lease id    await_ready          teardown, revoke
//! ```
//!
//! ## Core Components
//!
//! - **Broker session**: logs in once and performs read, write and revoke calls
//! - **Credential issuer**: turns a broker payload into a typed [`Credential`]
//! - **Activation poller**: waits for eventually consistent target systems
//! - **Session guard**: tears down secondary resources and revokes the lease
//!   exactly once, on normal exit or on a termination signal
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use breakglass::{CredentialIssuer, CredentialKind, IssueRequest, SessionGuard};
//! use breakglass::activation::RetryPolicy;
//! use breakglass::broker::{SecretsBroker, VaultSession};
//! use breakglass::config::BrokerConfig;
//! use breakglass::guard::termination_signal;
//! use std::sync::Arc;
//!
//! # async fn demo(config: BrokerConfig) -> anyhow::Result<()> {
//! let session = VaultSession::open(&config, "hunter2".into()).await?;
//! let broker: Arc<dyn SecretsBroker> = Arc::new(session);
//!
//! let lease = CredentialIssuer::new(Arc::clone(&broker))
//!     .issue(IssueRequest::new("mysql/db1/creds/readonly", CredentialKind::DatabaseLogin))
//!     .await?;
//!
//! let guard = Arc::new(SessionGuard::new(broker, lease, RetryPolicy::default()));
//! let listener = guard.spawn_listener(termination_signal());
//! guard.go_live();
//! // ... use guard.lease().credential() ...
//! listener.complete();
//! listener.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod broker;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod guard;
pub mod issuer;
pub mod lease;
pub mod observability;
pub mod targets;

// Re-export commonly used types and traits
pub use activation::{await_ready, ActivationState, RetryPolicy};
pub use credentials::{Credential, CredentialKind};
pub use errors::{Error, Result};
pub use guard::{SecondaryResource, SessionGuard};
pub use issuer::{CredentialIssuer, IssueRequest};
pub use lease::Lease;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
