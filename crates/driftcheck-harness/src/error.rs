//! Errors raised when the harness itself is misused.
//!
//! Problems with the provider or the resource under test are never errors;
//! they are recorded in [`crate::RunResult`].

use driftcheck_provider::ResourceId;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource identifier must not be empty")]
    EmptyResourceId,

    #[error("Test case for {id} declares no steps")]
    NoSteps { id: ResourceId },

    /// Concurrent runs must operate on disjoint resources.
    #[error("Resource identifier {id} is used by more than one concurrent test case")]
    DuplicateResourceId { id: ResourceId },

    #[error("Run task failed: {message}")]
    Join { message: String },
}

impl HarnessError {
    pub fn join(err: tokio::task::JoinError) -> Self {
        Self::Join {
            message: err.to_string(),
        }
    }
}
