//! Entry point tying the sequencer and teardown together.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use driftcheck_provider::ProviderAdapter;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::result::{Phase, RunResult, SequencerState, StepFailure, TeardownOutcome};
use crate::sequencer::{SequenceProgress, StepSequencer};
use crate::step::TestCase;
use crate::teardown::TeardownGuard;

/// Runs test cases against one provider adapter.
///
/// Cloning is cheap; clones share the adapter and configuration.
pub struct Harness<P: ProviderAdapter + 'static> {
    provider: Arc<P>,
    config: Arc<HarnessConfig>,
}

impl<P: ProviderAdapter + 'static> Clone for Harness<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P: ProviderAdapter + 'static> Harness<P> {
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidConfig`] if the configuration does not validate.
    pub fn new(provider: Arc<P>, config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate().map_err(HarnessError::InvalidConfig)?;
        Ok(Self {
            provider,
            config: Arc::new(config),
        })
    }

    pub fn with_defaults(provider: Arc<P>) -> Self {
        Self {
            provider,
            config: Arc::new(HarnessConfig::default()),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Applies and verifies every step of `case`, then tears the resource down.
    ///
    /// Step failures and teardown problems are reported in the returned
    /// [`RunResult`]; only misuse of the harness is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the case has an empty resource id or no steps.
    pub async fn run(&self, case: TestCase) -> Result<RunResult, HarnessError> {
        validate_case(&case)?;

        let span = info_span!(
            "run",
            resource_id = %case.id,
            backend = self.provider.backend_name(),
            steps = case.steps.len()
        );
        Ok(self.execute(case).instrument(span).await)
    }

    async fn execute(&self, case: TestCase) -> RunResult {
        let started = Instant::now();
        let mut progress = SequenceProgress::new();

        if let Some(reason) = precheck(&case) {
            warn!(%reason, "Pre-check failed, skipping");
            return RunResult {
                id: case.id,
                skipped: Some(reason),
                steps_total: case.steps.len(),
                steps_applied: 0,
                steps_passed: 0,
                step_failure: None,
                teardown: TeardownOutcome::NotRequired,
                last_observed: None,
                transitions: progress.transitions,
                elapsed_ms: elapsed_ms(started),
            };
        }

        info!("Starting run");
        let guard = TeardownGuard::arm(
            Arc::clone(&self.provider),
            case.id.clone(),
            self.config.teardown_policy(),
        );

        let sequencer = StepSequencer::new(
            self.provider.as_ref(),
            &case.id,
            self.config.verify_policy(),
        )
        .await_convergence(self.config.verify.await_convergence);

        let outcome = tokio::time::timeout(
            self.config.run_deadline(),
            AssertUnwindSafe(sequencer.run(&case.steps, &mut progress)).catch_unwind(),
        )
        .await;

        let step_failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(failure))) => Some(failure),
            Ok(Err(payload)) => {
                let (step, _) = interrupted_at(&progress);
                let message = panic_message(payload.as_ref());
                error!(step, %message, "Step panicked");
                progress.enter(SequencerState::Failed(step));
                Some(StepFailure::Panicked { step, message })
            }
            Err(_) => {
                let (step, phase) = interrupted_at(&progress);
                error!(step, %phase, "Run deadline exceeded");
                progress.enter(SequencerState::Failed(step));
                Some(StepFailure::DeadlineExceeded { step, phase })
            }
        };

        let teardown = guard.run().await;
        progress.enter(SequencerState::TornDown);

        let result = RunResult {
            id: case.id,
            skipped: None,
            steps_total: case.steps.len(),
            steps_applied: progress.steps_applied,
            steps_passed: progress.steps_passed,
            step_failure,
            teardown,
            last_observed: progress.last_observed,
            transitions: progress.transitions,
            elapsed_ms: elapsed_ms(started),
        };

        if result.is_success() {
            info!(elapsed_ms = result.elapsed_ms, "Run passed");
        } else {
            for message in result.failure_messages() {
                error!("{message}");
            }
        }
        result
    }

    /// Runs independent cases concurrently and returns results in input order.
    ///
    /// # Errors
    ///
    /// Returns an error before anything runs if any case is malformed or two
    /// cases share a resource id.
    pub async fn run_many(&self, cases: Vec<TestCase>) -> Result<Vec<RunResult>, HarnessError> {
        let mut seen = HashSet::with_capacity(cases.len());
        for case in &cases {
            validate_case(case)?;
            if !seen.insert(&case.id) {
                return Err(HarnessError::DuplicateResourceId {
                    id: case.id.clone(),
                });
            }
        }

        let total = cases.len();
        let mut tasks = JoinSet::new();
        for (index, case) in cases.into_iter().enumerate() {
            let harness = self.clone();
            tasks.spawn(async move { (index, harness.run(case).await) });
        }

        let mut results: Vec<Option<RunResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(HarnessError::join)?;
            results[index] = Some(result?);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

fn validate_case(case: &TestCase) -> Result<(), HarnessError> {
    if case.id.is_empty() {
        return Err(HarnessError::EmptyResourceId);
    }
    if case.steps.is_empty() {
        return Err(HarnessError::NoSteps {
            id: case.id.clone(),
        });
    }
    Ok(())
}

/// Runs the case's pre-check; `Some(reason)` means the case must be skipped.
fn precheck(case: &TestCase) -> Option<String> {
    let check = case.precheck.as_ref()?;
    match std::panic::catch_unwind(AssertUnwindSafe(|| check())) {
        Ok(Ok(())) => None,
        Ok(Err(reason)) => Some(reason),
        Err(payload) => Some(format!(
            "pre-check panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn interrupted_at(progress: &SequenceProgress) -> (usize, Phase) {
    progress
        .position()
        .unwrap_or((progress.steps_passed + 1, Phase::Applying))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
