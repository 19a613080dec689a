//! # driftcheck-harness
//!
//! Multi-step reconciliation test harness.
//!
//! A [`TestCase`] applies a sequence of desired configurations to one remote
//! resource through a [`ProviderAdapter`](driftcheck_provider::ProviderAdapter).
//! After each step the remote state is fetched and checked against the step's
//! [`Assertion`]s, retrying with backoff while the provider is still
//! converging. The first failing step stops the sequence. Whatever happens,
//! the resource is then destroyed and the harness polls until the provider
//! confirms it is gone.
//!
//! ## Example
//!
//! ```ignore
//! use driftcheck_harness::{Assertion, Harness, Step, TestCase};
//! use driftcheck_provider::ResourceId;
//! use serde_json::json;
//!
//! let harness = Harness::with_defaults(provider);
//! let case = TestCase::new(ResourceId::generate("tf-aurora-cluster"))
//!     .step(
//!         Step::new(json!({ "tags": { "Environment": "production" } }))
//!             .check(Assertion::count("tags", 1))
//!             .check(Assertion::equals("tags.Environment", "production")),
//!     )
//!     .step(
//!         Step::new(json!({ "tags": { "Environment": "production", "AnotherTag": "test" } }))
//!             .check(Assertion::count("tags", 2)),
//!     );
//!
//! let result = harness.run(case).await?;
//! assert!(result.is_success(), "{:#?}", result.failure_messages());
//! ```

pub mod assertion;
pub mod config;
mod error;
mod harness;
pub mod inspector;
pub mod observability;
pub mod poll;
mod result;
pub mod sequencer;
mod step;
pub mod teardown;

pub use assertion::{Assertion, CustomCheck, Failure, Predicate, evaluate};
pub use config::HarnessConfig;
pub use error::HarnessError;
pub use harness::Harness;
pub use inspector::{InspectError, StateInspector};
pub use poll::{Exhaustion, PollOutcome, PollPolicy, poll_with_backoff};
pub use result::{Phase, RunResult, RunStatus, SequencerState, StepFailure, TeardownOutcome};
pub use sequencer::{SequenceProgress, StepSequencer};
pub use step::{PreCheck, Step, TestCase};
pub use teardown::{TeardownGuard, TeardownVerifier};
