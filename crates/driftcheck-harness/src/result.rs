//! Terminal records handed to the reporting layer.
//!
//! Step numbers are 1-based throughout, matching the order steps were declared in.

use std::fmt;

use driftcheck_provider::{ObservedState, ProviderError, ResourceId};
use serde::Serialize;

use crate::assertion::Failure;

/// States of the step sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step")]
pub enum SequencerState {
    Idle,
    Applying(usize),
    Verifying(usize),
    Advancing(usize),
    Failed(usize),
    TornDown,
}

/// Phase of a step that was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Applying,
    Verifying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applying => write!(f, "applying"),
            Self::Verifying => write!(f, "verifying"),
        }
    }
}

/// Why a step stopped the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind")]
pub enum StepFailure {
    /// The provider rejected or could not perform the configuration change.
    #[error("step {step}: apply failed: {error}")]
    Apply { step: usize, error: ProviderError },

    /// The resource was reported absent while it was expected to exist.
    #[error("step {step}: {id} unexpectedly absent")]
    UnexpectedAbsence { step: usize, id: ResourceId },

    /// One or more assertions did not hold.
    #[error("step {step}: {} assertion(s) failed", .failures.len())]
    Assertions { step: usize, failures: Vec<Failure> },

    /// Fetch kept failing with unclassified errors until the verify budget ran out.
    ///
    /// `unconverged` holds the assertions that still failed on the last
    /// snapshot fetched before that, if any.
    #[error("step {step}: fetching {id} failed after {attempts} attempt(s): {error}")]
    AmbiguousFetch {
        step: usize,
        id: ResourceId,
        attempts: u32,
        error: ProviderError,
        unconverged: Vec<Failure>,
    },

    /// The run deadline or the verify budget expired mid-step.
    #[error("step {step}: deadline exceeded while {phase}")]
    DeadlineExceeded { step: usize, phase: Phase },

    /// A caller-supplied check panicked.
    #[error("step {step}: panicked: {message}")]
    Panicked { step: usize, message: String },
}

impl StepFailure {
    pub fn step(&self) -> usize {
        match self {
            Self::Apply { step, .. }
            | Self::UnexpectedAbsence { step, .. }
            | Self::Assertions { step, .. }
            | Self::AmbiguousFetch { step, .. }
            | Self::DeadlineExceeded { step, .. }
            | Self::Panicked { step, .. } => *step,
        }
    }

    pub fn assertion_failures(&self) -> &[Failure] {
        match self {
            Self::Assertions { failures, .. }
            | Self::AmbiguousFetch {
                unconverged: failures,
                ..
            } => failures,
            _ => &[],
        }
    }
}

/// What teardown verification concluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome")]
pub enum TeardownOutcome {
    /// The provider confirmed the resource is gone.
    Verified { attempts: u32 },
    /// The resource was still reported present when the budget ran out.
    Unverified {
        id: ResourceId,
        attempts: u32,
        waited_ms: u64,
    },
    /// `destroy` itself kept failing. `still_present` is `None` when the
    /// follow-up fetch could not tell.
    DestroyFailed {
        id: ResourceId,
        error: ProviderError,
        still_present: Option<bool>,
    },
    /// Absence polling ended on an unclassified error.
    PollFailed {
        id: ResourceId,
        attempts: u32,
        error: ProviderError,
    },
    /// Nothing was applied, so there is nothing to remove.
    NotRequired,
}

impl TeardownOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. } | Self::NotRequired)
    }

    /// Human-readable problem description, `None` when teardown is clean.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Verified { .. } | Self::NotRequired => None,
            Self::Unverified {
                id,
                attempts,
                waited_ms,
            } => Some(format!(
                "teardown unverified: {id} still present after {attempts} check(s) over {waited_ms}ms, resource may be leaked"
            )),
            Self::DestroyFailed {
                id,
                error,
                still_present,
            } => {
                let state = match still_present {
                    Some(true) => "still present",
                    Some(false) => "absent",
                    None => "state unknown",
                };
                Some(format!("teardown failed: destroying {id}: {error} ({state})"))
            }
            Self::PollFailed {
                id,
                attempts,
                error,
            } => Some(format!(
                "teardown unverified: checking {id} failed after {attempts} attempt(s): {error}"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one harness invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub id: ResourceId,
    /// Reason the pre-check refused to run the case.
    pub skipped: Option<String>,
    pub steps_total: usize,
    pub steps_applied: usize,
    pub steps_passed: usize,
    pub step_failure: Option<StepFailure>,
    pub teardown: TeardownOutcome,
    /// Most recent snapshot fetched while verifying.
    pub last_observed: Option<ObservedState>,
    /// Every sequencer state in the order it was entered.
    pub transitions: Vec<SequencerState>,
    pub elapsed_ms: u64,
}

impl RunResult {
    pub fn status(&self) -> RunStatus {
        if self.skipped.is_some() {
            RunStatus::Skipped
        } else if self.step_failure.is_none() && self.teardown.is_verified() {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Passed
    }

    /// 1-based number of the step that failed, if any.
    pub fn failed_step(&self) -> Option<usize> {
        self.step_failure.as_ref().map(StepFailure::step)
    }

    pub fn assertion_failures(&self) -> &[Failure] {
        self.step_failure
            .as_ref()
            .map(StepFailure::assertion_failures)
            .unwrap_or(&[])
    }

    /// Every problem of the run: the step failure, each violated assertion and
    /// the teardown problem, in that order.
    pub fn failure_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        if let Some(failure) = &self.step_failure {
            messages.push(failure.to_string());
            messages.extend(failure.assertion_failures().iter().map(|f| format!("  {f}")));
        }
        if let Some(teardown) = self.teardown.failure_message() {
            messages.push(teardown);
        }
        messages
    }
}
