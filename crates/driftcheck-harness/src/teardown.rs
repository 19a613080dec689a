//! Removal of the resource under test and confirmation that it is gone.

use std::ops::ControlFlow;
use std::sync::Arc;

use driftcheck_provider::{ErrorCategory, ProviderAdapter, ProviderError, ResourceId};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::inspector::{InspectError, StateInspector};
use crate::poll::{PollOutcome, PollPolicy, poll_with_backoff};
use crate::result::TeardownOutcome;

enum Lingering {
    Present,
    Ambiguous(ProviderError),
}

fn is_transient(error: &ProviderError) -> bool {
    matches!(
        error.category(),
        ErrorCategory::Transient | ErrorCategory::Infrastructure
    )
}

/// Destroys a resource, then polls until the provider reports it absent.
///
/// One budget covers both the destroy call (retried on throttling and
/// connection errors) and the absence polling.
pub struct TeardownVerifier<'a, P: ProviderAdapter + ?Sized> {
    provider: &'a P,
    policy: PollPolicy,
}

impl<'a, P: ProviderAdapter + ?Sized> TeardownVerifier<'a, P> {
    pub fn new(provider: &'a P, policy: PollPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn verify(&self, id: &ResourceId) -> TeardownOutcome {
        let started = Instant::now();

        if let Err(error) = self.destroy(id).await {
            error!(resource_id = %id, error = %error, "Destroy failed");
            let still_present = self.lingers_once(id).await;
            return TeardownOutcome::DestroyFailed {
                id: id.clone(),
                error,
                still_present,
            };
        }

        let remaining = self.policy.timeout.saturating_sub(started.elapsed());
        let inspector = StateInspector::new(self.provider);
        let inspector = &inspector;
        let outcome = poll_with_backoff(&self.policy.with_timeout(remaining), |attempt| async move {
            match inspector.observe(id).await {
                Err(InspectError::Absent { .. }) => ControlFlow::Break(()),
                Ok(_) => ControlFlow::Continue(Lingering::Present),
                Err(InspectError::Ambiguous { source, .. }) => {
                    warn!(resource_id = %id, attempt, error = %source, "Absence check failed, retrying");
                    ControlFlow::Continue(Lingering::Ambiguous(source))
                }
            }
        })
        .await;

        match outcome {
            PollOutcome::Ready { attempts, .. } => {
                info!(resource_id = %id, attempts, "Teardown verified");
                TeardownOutcome::Verified { attempts }
            }
            PollOutcome::Exhausted {
                last: Some(Lingering::Ambiguous(error)),
                attempts,
                ..
            } => {
                error!(resource_id = %id, attempts, error = %error, "Teardown could not be verified");
                TeardownOutcome::PollFailed {
                    id: id.clone(),
                    error,
                    attempts,
                }
            }
            PollOutcome::Exhausted { attempts, .. } => {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                error!(resource_id = %id, attempts, waited_ms, "Resource still present after teardown, possible leak");
                TeardownOutcome::Unverified {
                    id: id.clone(),
                    attempts,
                    waited_ms,
                }
            }
        }
    }

    /// Calls `destroy`, treating "not found" as already destroyed.
    async fn destroy(&self, id: &ResourceId) -> Result<(), ProviderError> {
        let provider = self.provider;
        let outcome = poll_with_backoff(&self.policy, |attempt| async move {
            match provider.destroy(id).await {
                Ok(()) => ControlFlow::Break(Ok(())),
                Err(err) if provider.is_not_found(&err) => {
                    info!(resource_id = %id, "Resource already absent");
                    ControlFlow::Break(Ok(()))
                }
                Err(err) if is_transient(&err) => {
                    warn!(resource_id = %id, attempt, error = %err, "Destroy failed, retrying");
                    ControlFlow::Continue(err)
                }
                Err(err) => ControlFlow::Break(Err(err)),
            }
        })
        .await;

        match outcome {
            PollOutcome::Ready { value, .. } => value,
            PollOutcome::Exhausted {
                last: Some(error), ..
            } => Err(error),
            PollOutcome::Exhausted { last: None, .. } => Err(ProviderError::internal(format!(
                "destroy did not return within {}ms",
                self.policy.timeout.as_millis()
            ))),
        }
    }

    /// One fetch after a failed destroy; `None` when the answer was ambiguous.
    async fn lingers_once(&self, id: &ResourceId) -> Option<bool> {
        match StateInspector::new(self.provider).observe(id).await {
            Ok(_) => Some(true),
            Err(InspectError::Absent { .. }) => Some(false),
            Err(InspectError::Ambiguous { .. }) => None,
        }
    }
}

/// Scoped teardown registration.
///
/// Armed before the first step is applied. [`TeardownGuard::run`] performs the
/// teardown and disarms the guard; a guard dropped while still armed (the
/// owning future was cancelled) schedules the teardown on the current runtime
/// so the resource is not leaked silently.
pub struct TeardownGuard<P: ProviderAdapter + 'static> {
    provider: Arc<P>,
    id: ResourceId,
    policy: PollPolicy,
    armed: bool,
}

impl<P: ProviderAdapter + 'static> TeardownGuard<P> {
    pub fn arm(provider: Arc<P>, id: ResourceId, policy: PollPolicy) -> Self {
        Self {
            provider,
            id,
            policy,
            armed: true,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub async fn run(mut self) -> TeardownOutcome {
        let outcome = TeardownVerifier::new(self.provider.as_ref(), self.policy)
            .verify(&self.id)
            .await;
        self.armed = false;
        outcome
    }
}

impl<P: ProviderAdapter + 'static> Drop for TeardownGuard<P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(resource_id = %self.id, "Run abandoned before teardown, scheduling background teardown");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(resource_id = %self.id, "No runtime available, resource may be leaked");
            return;
        };
        let provider = Arc::clone(&self.provider);
        let id = self.id.clone();
        let policy = self.policy;
        handle.spawn(async move {
            let outcome = TeardownVerifier::new(provider.as_ref(), policy)
                .verify(&id)
                .await;
            if let Some(message) = outcome.failure_message() {
                error!(resource_id = %id, "{message}");
            }
        });
    }
}
