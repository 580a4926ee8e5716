//! # Session Guard
//!
//! Owns a [`Lease`] and any secondary resource created with it, and makes sure
//! both are removed exactly once on every exit path.
//!
//! ```text
//! Starting ──go_live──► Live ──cleanup──► Cleaning ──► Closed
//!     └──────────────cleanup──────────────┘
//! ```
//!
//! Cleanup can be triggered by the foreground path finishing normally
//! ([`ListenerHandle::complete`]) or by a termination signal. Both routes go
//! through one single-fire cell, so concurrent triggers share one execution
//! and one result. The sequence is strict: tear down the secondary resource
//! (retrying transient failures), then revoke the lease. A teardown that
//! cannot complete stops the sequence before revocation so the operator can
//! still identify the resource.
//!
//! # Example
//!
//! ```rust,ignore
//! let guard = Arc::new(SessionGuard::new(broker, lease, settings.teardown_policy()));
//! let listener = guard.spawn_listener(termination_signal());
//! guard.go_live();
//! // ... hand the credential to the operator ...
//! listener.complete();
//! let report = listener.join().await?;
//! ```

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, OnceCell, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::activation::{retry_transient, FailureReason, RetryPolicy};
use crate::broker::{BrokerError, SecretsBroker};
use crate::lease::Lease;
use crate::targets::TargetError;

/// Lifecycle phase of a guarded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum GuardState {
    Starting = 0,
    Live = 1,
    Cleaning = 2,
    Closed = 3,
}

impl GuardState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Live,
            2 => Self::Cleaning,
            _ => Self::Closed,
        }
    }
}

/// A side effect created on the target system with the leased credential.
#[async_trait]
pub trait SecondaryResource: Send + Sync {
    /// Human-readable identity used in logs and remediation messages.
    fn describe(&self) -> String;

    async fn teardown(&self) -> Result<(), TargetError>;

    /// Whether a teardown failure is worth another attempt.
    fn is_transient(&self, _err: &TargetError) -> bool {
        false
    }
}

/// What a successful cleanup removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub lease_id: String,
    pub secondary_torn_down: Option<String>,
}

/// Cleanup failures, naming exactly which half was left behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CleanupError {
    #[error(
        "Failed to remove {resource}: {reason}. Lease '{lease_id}' was NOT revoked. \
         Remove the resource by hand, then run `vault lease revoke {lease_id}`"
    )]
    SecondaryResource { resource: String, lease_id: String, reason: FailureReason },

    #[error(
        "Failed to revoke lease '{lease_id}': {reason}. \
         Revoke it by hand with `vault lease revoke {lease_id}`"
    )]
    LeaseRevocation { lease_id: String, reason: BrokerError, secondary_torn_down: Option<String> },
}

impl CleanupError {
    pub fn lease_id(&self) -> &str {
        match self {
            Self::SecondaryResource { lease_id, .. } | Self::LeaseRevocation { lease_id, .. } => {
                lease_id
            }
        }
    }
}

/// Why [`SessionGuard::attach_secondary`] refused a resource.
///
/// The resource is handed back either way; the caller owns its teardown.
#[derive(thiserror::Error)]
pub enum AttachError {
    #[error("Session is already closing; {} is not tracked by it", .0.describe())]
    Closing(Box<dyn SecondaryResource>),

    #[error("Session already tracks {tracked}; {} is not tracked by it", .resource.describe())]
    Occupied { tracked: String, resource: Box<dyn SecondaryResource> },
}

impl AttachError {
    pub fn into_resource(self) -> Box<dyn SecondaryResource> {
        match self {
            Self::Closing(resource) | Self::Occupied { resource, .. } => resource,
        }
    }
}

impl fmt::Debug for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closing(resource) => f.debug_tuple("Closing").field(&resource.describe()).finish(),
            Self::Occupied { tracked, resource } => f
                .debug_struct("Occupied")
                .field("tracked", tracked)
                .field("resource", &resource.describe())
                .finish(),
        }
    }
}

pub type CleanupResult = Result<CleanupReport, CleanupError>;

/// Keeps cleanup from starting while held. See [`SessionGuard::hold`].
#[must_use = "cleanup is only held back while this value is alive"]
pub struct CleanupHold<'a> {
    _permit: RwLockReadGuard<'a, ()>,
}

pub struct SessionGuard {
    broker: Arc<dyn SecretsBroker>,
    lease: Lease,
    secondary: Mutex<Option<Box<dyn SecondaryResource>>>,
    teardown_policy: RetryPolicy,
    state: AtomicU8,
    closing: Notify,
    critical: RwLock<()>,
    cleanup: OnceCell<CleanupResult>,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("lease_id", &self.lease.lease_id())
            .field("state", &self.state())
            .finish()
    }
}

impl SessionGuard {
    pub fn new(broker: Arc<dyn SecretsBroker>, lease: Lease, teardown_policy: RetryPolicy) -> Self {
        Self {
            broker,
            lease,
            secondary: Mutex::new(None),
            teardown_policy,
            state: AtomicU8::new(GuardState::Starting as u8),
            closing: Notify::new(),
            critical: RwLock::new(()),
            cleanup: OnceCell::new(),
        }
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `Starting -> Live`. Returns false if cleanup already began.
    pub fn go_live(&self) -> bool {
        let moved = self
            .state
            .compare_exchange(
                GuardState::Starting as u8,
                GuardState::Live as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            debug!(lease_id = %self.lease.lease_id(), "Session live");
        }
        moved
    }

    /// Hand a secondary resource to the guard so cleanup removes it first.
    ///
    /// A session tracks at most one resource. A second attach is refused and
    /// the already tracked resource stays in place.
    pub fn attach_secondary(&self, resource: Box<dyn SecondaryResource>) -> Result<(), AttachError> {
        let mut slot = self.secondary.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() >= GuardState::Cleaning {
            return Err(AttachError::Closing(resource));
        }
        if let Some(tracked) = slot.as_ref() {
            return Err(AttachError::Occupied { tracked: tracked.describe(), resource });
        }
        info!(resource = %resource.describe(), "Tracking secondary resource");
        *slot = Some(resource);
        Ok(())
    }

    /// Hold cleanup back while a secondary resource is created and attached.
    ///
    /// A trigger that arrives meanwhile waits for the hold to drop, so the new
    /// resource is always torn down before the lease is revoked. Returns
    /// `None` when cleanup has already begun.
    pub async fn hold(&self) -> Option<CleanupHold<'_>> {
        let permit = self.critical.read().await;
        if self.state() >= GuardState::Cleaning {
            return None;
        }
        Some(CleanupHold { _permit: permit })
    }

    /// Resolves once cleanup has started (from any trigger).
    pub async fn closing(&self) {
        loop {
            let notified = self.closing.notified();
            if self.state() >= GuardState::Cleaning {
                return;
            }
            notified.await;
        }
    }

    /// Run the cleanup sequence, or wait for the run already in flight.
    pub async fn cleanup(&self) -> CleanupResult {
        self.cleanup.get_or_init(|| self.run_cleanup()).await.clone()
    }

    async fn run_cleanup(&self) -> CleanupResult {
        let lease_id = self.lease.lease_id().to_string();

        let secondary = {
            let _exclusive = self.critical.write().await;
            let mut slot = self.secondary.lock().unwrap_or_else(PoisonError::into_inner);
            self.state.store(GuardState::Cleaning as u8, Ordering::Release);
            slot.take()
        };
        self.closing.notify_waiters();
        info!(lease_id = %lease_id, "Cleaning up session");

        let result = self.teardown_then_revoke(lease_id, secondary).await;
        self.state.store(GuardState::Closed as u8, Ordering::Release);
        result
    }

    async fn teardown_then_revoke(
        &self,
        lease_id: String,
        secondary: Option<Box<dyn SecondaryResource>>,
    ) -> CleanupResult {
        let mut torn_down = None;

        if let Some(resource) = secondary {
            let name = resource.describe();
            let outcome = retry_transient(
                || resource.teardown(),
                |err: &TargetError| resource.is_transient(err),
                &self.teardown_policy,
            )
            .await;

            if let Err(reason) = outcome {
                error!(resource = %name, lease_id = %lease_id, %reason, "Secondary resource teardown failed");
                return Err(CleanupError::SecondaryResource { resource: name, lease_id, reason });
            }
            info!(resource = %name, "Secondary resource removed");
            torn_down = Some(name);
        }

        if let Err(reason) = self.lease.revoke(self.broker.as_ref()).await {
            error!(lease_id = %lease_id, %reason, "Lease revocation failed");
            return Err(CleanupError::LeaseRevocation {
                lease_id,
                reason,
                secondary_torn_down: torn_down,
            });
        }

        info!(lease_id = %lease_id, "Lease revoked");
        Ok(CleanupReport { lease_id, secondary_torn_down: torn_down })
    }

    /// Start the background task that runs cleanup on `signal` or on
    /// [`ListenerHandle::complete`], whichever comes first.
    pub fn spawn_listener<S>(self: &Arc<Self>, signal: S) -> ListenerHandle
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let done = Arc::new(Notify::new());
        let notified = Arc::clone(&done);
        let guard = Arc::clone(self);

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = signal => info!("Termination requested, ending session"),
                _ = notified.notified() => debug!("Session finished, ending session"),
            }
            guard.cleanup().await
        });

        ListenerHandle { guard: Arc::clone(self), done, task }
    }
}

/// The foreground's side of the rendezvous with the listener task.
pub struct ListenerHandle {
    guard: Arc<SessionGuard>,
    done: Arc<Notify>,
    task: JoinHandle<CleanupResult>,
}

impl ListenerHandle {
    /// Signal normal completion. Safe to call more than once.
    pub fn complete(&self) {
        self.done.notify_one();
    }

    /// Resolves once cleanup has started, for racing against foreground work.
    pub async fn interrupted(&self) {
        self.guard.closing().await
    }

    /// Wait for cleanup to finish.
    pub async fn join(self) -> CleanupResult {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, "Cleanup listener did not finish, cleaning up in foreground");
                self.guard.cleanup().await
            }
        }
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(?err, "failed to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
