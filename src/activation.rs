//! # Activation Polling
//!
//! Target systems such as IAM accept a freshly issued credential only after a
//! propagation delay. [`await_ready`] probes until the credential is accepted,
//! telling "not yet propagated" apart from a hard rejection with a caller
//! supplied classifier. [`retry_transient`] runs the same loop for teardown
//! calls that can fail with a transient "not yet modifiable" condition.
//!
//! Both loops stop after `max_wait / interval` attempts when the policy is
//! bounded. There is no sleep after the final attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credentials::CredentialKind;
use crate::targets::TargetError;

/// Fixed-interval retry schedule with an optional overall bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

impl RetryPolicy {
    pub fn bounded(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait: Some(max_wait) }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self { interval, max_wait: None }
    }

    /// Number of probes a bounded policy allows. Always at least one.
    pub fn max_attempts(&self) -> Option<u32> {
        let interval = self.interval.as_millis().max(1);
        self.max_wait.map(|wait| {
            let attempts = (wait.as_millis() / interval).max(1);
            u32::try_from(attempts).unwrap_or(u32::MAX)
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1))
    }
}

/// Classification of a single probe against the target system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Accepted,
    NotYetPropagated(String),
    HardError(TargetError),
}

impl ProbeOutcome {
    pub fn classify<C>(result: Result<(), TargetError>, is_transient: &C) -> Self
    where
        C: Fn(&TargetError) -> bool,
    {
        match result {
            Ok(()) => Self::Accepted,
            Err(err) if is_transient(&err) => Self::NotYetPropagated(err.code),
            Err(err) => Self::HardError(err),
        }
    }
}

/// Why a credential never became usable, or a teardown never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout { elapsed: Duration, attempts: u32 },
    Rejected(TargetError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, attempts } => write!(
                f,
                "timeout after {:.1}s ({} attempts)",
                elapsed.as_secs_f64(),
                attempts
            ),
            Self::Rejected(err) => write!(f, "rejected by target system: {}", err),
        }
    }
}

/// Whether the target system currently accepts an issued credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationState {
    Pending,
    Ready,
    Failed(FailureReason),
}

impl ActivationState {
    /// State right after issuance: pending only for targets with a propagation delay.
    pub fn after_issue(kind: CredentialKind) -> Self {
        if kind.requires_activation() {
            Self::Pending
        } else {
            Self::Ready
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Probe until the target accepts the credential.
///
/// Returns [`ActivationState::Ready`] on the first accepted probe, or
/// [`ActivationState::Failed`] on a hard error or when the policy bound is hit.
pub async fn await_ready<P, Fut, C>(probe: P, is_transient: C, policy: &RetryPolicy) -> ActivationState
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TargetError>>,
    C: Fn(&TargetError) -> bool,
{
    match poll("activation", probe, is_transient, policy).await {
        Ok(attempts) => {
            info!(attempts, "Credential accepted by target system");
            ActivationState::Ready
        }
        Err(reason) => {
            warn!(%reason, "Credential never became usable");
            ActivationState::Failed(reason)
        }
    }
}

/// Run `op` until it succeeds, retrying only on transient errors.
pub async fn retry_transient<P, Fut, C>(
    op: P,
    is_transient: C,
    policy: &RetryPolicy,
) -> Result<(), FailureReason>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TargetError>>,
    C: Fn(&TargetError) -> bool,
{
    poll("teardown", op, is_transient, policy).await.map(|_| ())
}

async fn poll<P, Fut, C>(
    phase: &'static str,
    mut probe: P,
    is_transient: C,
    policy: &RetryPolicy,
) -> Result<u32, FailureReason>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TargetError>>,
    C: Fn(&TargetError) -> bool,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        match ProbeOutcome::classify(probe().await, &is_transient) {
            ProbeOutcome::Accepted => return Ok(attempts),
            ProbeOutcome::HardError(err) => return Err(FailureReason::Rejected(err)),
            ProbeOutcome::NotYetPropagated(code) => {
                if max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(FailureReason::Timeout { elapsed: started.elapsed(), attempts });
                }
                debug!(phase, attempts, code = %code, "Target not ready yet, retrying");
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn not_yet() -> TargetError {
        TargetError::new("InvalidClientTokenId", "The security token included in the request is invalid")
    }

    fn transient(err: &TargetError) -> bool {
        err.code == "InvalidClientTokenId"
    }

    /// Scripted probe; once the script runs out it keeps returning the last entry.
    fn scripted(
        script: Vec<Result<(), TargetError>>,
    ) -> (Arc<Mutex<u32>>, impl FnMut() -> std::future::Ready<Result<(), TargetError>>) {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut script: VecDeque<_> = script.into();
        let probe = move || {
            *counter.lock().unwrap() += 1;
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            std::future::ready(next)
        };
        (calls, probe)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_two_not_yet_propagated() {
        let (calls, probe) = scripted(vec![Err(not_yet()), Err(not_yet()), Ok(())]);
        let started = Instant::now();

        let state = await_ready(probe, transient, &RetryPolicy::default()).await;

        assert_eq!(state, ActivationState::Ready);
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_error_fails_without_retry() {
        let denied = TargetError::new("AccessDenied", "not authorized");
        let (calls, probe) = scripted(vec![Err(denied.clone())]);
        let started = Instant::now();

        let state = await_ready(probe, transient, &RetryPolicy::default()).await;

        assert_eq!(state, ActivationState::Failed(FailureReason::Rejected(denied)));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_times_out_after_exact_attempts() {
        let (calls, probe) = scripted(vec![Err(not_yet())]);
        let policy = RetryPolicy::bounded(Duration::from_secs(1), Duration::from_secs(5));

        let state = await_ready(probe, transient, &policy).await;

        match state {
            ActivationState::Failed(FailureReason::Timeout { elapsed, attempts }) => {
                assert_eq!(attempts, 5);
                assert_eq!(elapsed, Duration::from_secs(4));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(*calls.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_succeeds_after_one_retry() {
        let busy = TargetError::new("EntityTemporarilyUnmodifiable", "busy");
        let (calls, op) = scripted(vec![Err(busy), Ok(())]);

        let result = retry_transient(
            op,
            |e: &TargetError| e.code == "EntityTemporarilyUnmodifiable",
            &RetryPolicy::default(),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_max_attempts() {
        let one_second = Duration::from_secs(1);
        assert_eq!(RetryPolicy::unbounded(one_second).max_attempts(), None);
        assert_eq!(RetryPolicy::bounded(one_second, Duration::from_secs(300)).max_attempts(), Some(300));
        assert_eq!(RetryPolicy::bounded(one_second, Duration::from_millis(10)).max_attempts(), Some(1));
    }

    #[test]
    fn test_initial_state_by_kind() {
        assert_eq!(ActivationState::after_issue(CredentialKind::CloudIdentity), ActivationState::Pending);
        assert!(ActivationState::after_issue(CredentialKind::DatabaseLogin).is_ready());
    }

    #[test]
    fn test_timeout_reason_mentions_timeout() {
        let reason = FailureReason::Timeout { elapsed: Duration::from_secs(4), attempts: 5 };
        assert!(reason.to_string().starts_with("timeout"));
    }
}
