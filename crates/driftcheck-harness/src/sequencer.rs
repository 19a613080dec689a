//! Applies steps in order and verifies each before moving on.

use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};

use driftcheck_provider::{ObservedState, ProviderAdapter, ProviderError, ResourceId};
use tracing::{debug, info, warn};

use crate::assertion::{Failure, evaluate};
use crate::inspector::{InspectError, StateInspector};
use crate::poll::{PollOutcome, PollPolicy, poll_with_backoff};
use crate::result::{Phase, SequencerState, StepFailure};
use crate::step::Step;

/// Bookkeeping the sequencer updates as it goes.
///
/// Lives outside the sequencer future so the caller can still read it after
/// the future was cancelled by a deadline or unwound by a panic.
#[derive(Debug, Default)]
pub struct SequenceProgress {
    pub transitions: Vec<SequencerState>,
    pub steps_applied: usize,
    pub steps_passed: usize,
    pub last_observed: Option<ObservedState>,
}

impl SequenceProgress {
    pub fn new() -> Self {
        Self {
            transitions: vec![SequencerState::Idle],
            ..Self::default()
        }
    }

    pub fn enter(&mut self, state: SequencerState) {
        debug!(?state, "Sequencer transition");
        self.transitions.push(state);
    }

    pub fn state(&self) -> SequencerState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(SequencerState::Idle)
    }

    /// Step and phase the sequencer was in, if it was inside a step.
    pub fn position(&self) -> Option<(usize, Phase)> {
        match self.state() {
            SequencerState::Applying(step) => Some((step, Phase::Applying)),
            SequencerState::Verifying(step) => Some((step, Phase::Verifying)),
            _ => None,
        }
    }
}

enum Verdict {
    Converged,
    Diverged,
    Absent,
}

enum Pending {
    Ambiguous(ProviderError),
    Unconverged,
}

#[derive(Default)]
struct Evaluated {
    state: Option<ObservedState>,
    failures: Vec<Failure>,
}

pub struct StepSequencer<'a, P: ProviderAdapter + ?Sized> {
    provider: &'a P,
    id: &'a ResourceId,
    policy: PollPolicy,
    await_convergence: bool,
}

impl<'a, P: ProviderAdapter + ?Sized> StepSequencer<'a, P> {
    pub fn new(provider: &'a P, id: &'a ResourceId, policy: PollPolicy) -> Self {
        Self {
            provider,
            id,
            policy,
            await_convergence: true,
        }
    }

    /// Whether failing assertions are re-checked until the verify budget runs out.
    pub fn await_convergence(mut self, enabled: bool) -> Self {
        self.await_convergence = enabled;
        self
    }

    /// Runs every step in declaration order and stops at the first failure.
    ///
    /// Steps after a failed one are never applied.
    pub async fn run(
        &self,
        steps: &[Step],
        progress: &mut SequenceProgress,
    ) -> Result<(), StepFailure> {
        for (index, step) in steps.iter().enumerate() {
            let number = index + 1;

            progress.enter(SequencerState::Applying(number));
            if let Err(error) = self.provider.apply(self.id, &step.config).await {
                warn!(step = number, error = %error, category = %error.category(), "Apply failed");
                progress.enter(SequencerState::Failed(number));
                return Err(StepFailure::Apply {
                    step: number,
                    error,
                });
            }
            progress.steps_applied = number;

            progress.enter(SequencerState::Verifying(number));
            if let Err(failure) = self.verify(number, step, progress).await {
                warn!(step = number, %failure, "Step failed");
                progress.enter(SequencerState::Failed(number));
                return Err(failure);
            }
            progress.steps_passed = number;
            info!(
                step = number,
                name = step.name.as_deref().unwrap_or(""),
                "Step verified"
            );
            progress.enter(SequencerState::Advancing(number));
        }
        Ok(())
    }

    async fn verify(
        &self,
        number: usize,
        step: &Step,
        progress: &mut SequenceProgress,
    ) -> Result<(), StepFailure> {
        let inspector = StateInspector::new(self.provider);
        let inspector = &inspector;
        let id = self.id;
        let assertions = step.assertions.as_slice();
        let await_convergence = self.await_convergence;
        // Latest snapshot and its failures, kept across attempts.
        let latest: Mutex<Evaluated> = Mutex::default();
        let latest_ref = &latest;

        let outcome = poll_with_backoff(&self.policy, |attempt| async move {
            match inspector.observe(id).await {
                Ok(state) => {
                    let failures = evaluate(&state, assertions);
                    let failing = failures.len();
                    *latest_ref.lock().unwrap_or_else(PoisonError::into_inner) = Evaluated {
                        state: Some(state),
                        failures,
                    };
                    if failing == 0 {
                        ControlFlow::Break(Verdict::Converged)
                    } else if await_convergence {
                        debug!(
                            step = number,
                            attempt,
                            failing,
                            "Assertions not satisfied yet"
                        );
                        ControlFlow::Continue(Pending::Unconverged)
                    } else {
                        ControlFlow::Break(Verdict::Diverged)
                    }
                }
                Err(InspectError::Absent { .. }) => ControlFlow::Break(Verdict::Absent),
                Err(InspectError::Ambiguous { source, .. }) => {
                    warn!(step = number, attempt, error = %source, "Fetch failed, retrying");
                    ControlFlow::Continue(Pending::Ambiguous(source))
                }
            }
        })
        .await;

        let Evaluated { state, failures } =
            latest.into_inner().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            progress.last_observed = state;
        }

        match outcome {
            PollOutcome::Ready {
                value: Verdict::Converged,
                ..
            } => Ok(()),
            PollOutcome::Ready {
                value: Verdict::Diverged,
                ..
            }
            | PollOutcome::Exhausted {
                last: Some(Pending::Unconverged),
                ..
            } => Err(StepFailure::Assertions {
                step: number,
                failures,
            }),
            PollOutcome::Ready {
                value: Verdict::Absent,
                ..
            } => Err(StepFailure::UnexpectedAbsence {
                step: number,
                id: self.id.clone(),
            }),
            PollOutcome::Exhausted {
                last: Some(Pending::Ambiguous(error)),
                attempts,
                ..
            } => Err(StepFailure::AmbiguousFetch {
                step: number,
                id: self.id.clone(),
                attempts,
                error,
                unconverged: failures,
            }),
            PollOutcome::Exhausted { last: None, .. } => Err(StepFailure::DeadlineExceeded {
                step: number,
                phase: Phase::Verifying,
            }),
        }
    }
}
