//! Single-shot state inspection.

use driftcheck_provider::{ObservedState, ProviderAdapter, ProviderError, ResourceId};
use tracing::trace;

/// Why an inspection did not produce a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InspectError {
    /// The provider reported the resource as definitively absent.
    #[error("{id} not found")]
    Absent { id: ResourceId },
    /// The provider failed in a way that says nothing about existence.
    #[error("fetching {id} failed: {source}")]
    Ambiguous {
        id: ResourceId,
        #[source]
        source: ProviderError,
    },
}

impl InspectError {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent { .. })
    }
}

/// Fetches and classifies the current remote state of a resource.
///
/// The inspector never retries; callers own the retry policy.
pub struct StateInspector<'a, P: ProviderAdapter + ?Sized> {
    provider: &'a P,
}

impl<'a, P: ProviderAdapter + ?Sized> StateInspector<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    pub async fn observe(&self, id: &ResourceId) -> Result<ObservedState, InspectError> {
        match self.provider.fetch(id).await {
            Ok(state) => {
                // A snapshot describing another resource is as good as no answer.
                if let Some(reported) = state.get("id") {
                    if reported != id.as_str() {
                        return Err(InspectError::Ambiguous {
                            id: id.clone(),
                            source: ProviderError::internal(format!(
                                "provider described {reported} instead"
                            )),
                        });
                    }
                }
                trace!(resource_id = %id, attributes = state.len(), "Observed state");
                Ok(state)
            }
            Err(err) if self.provider.is_not_found(&err) => {
                Err(InspectError::Absent { id: id.clone() })
            }
            Err(err) => Err(InspectError::Ambiguous {
                id: id.clone(),
                source: err,
            }),
        }
    }
}
