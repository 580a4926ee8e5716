//! Secrets broker access.
//!
//! The [`SecretsBroker`] trait is the seam between the credential lifecycle and
//! the broker that issues leased secrets:
//! - **read**: fetch a secret at a path
//! - **write**: issue a secret that takes request parameters
//! - **revoke**: drop a lease (idempotent)
//!
//! [`VaultSession`] implements it against HashiCorp Vault after a password
//! login. Tests substitute in-memory brokers.
//!
//! # Security Considerations
//!
//! - The operator password is only borrowed for the login call
//! - The session token is never logged or printed
//! - Broker calls never retry on their own

pub mod client;
pub mod error;
pub mod types;
pub mod vault;

pub use client::{Ack, Params, SecretPayload, SecretsBroker};
pub use error::{BrokerError, Result};
pub use types::SecretString;
pub use vault::VaultSession;
