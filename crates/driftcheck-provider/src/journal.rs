//! JournaledProvider - A provider wrapper that records every call it forwards.
//!
//! This wrapper delegates all operations to an inner adapter while appending
//! an entry to a shared [`CallJournal`] after each call completes.
//!
//! # Example
//!
//! ```ignore
//! use driftcheck_provider::{CallJournal, CallKind, JournaledProvider};
//!
//! let journal = CallJournal::new();
//! let provider = JournaledProvider::new(inner, journal.clone());
//!
//! provider.destroy(&id).await?;
//! assert_eq!(journal.count(CallKind::Destroy, &id), 1);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::traits::ProviderAdapter;
use crate::types::{DesiredConfiguration, ObservedState, ResourceId};

/// The provider operation that was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    Apply,
    Fetch,
    Destroy,
}

/// How a recorded call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutcome {
    Ok,
    NotFound,
    Failed(String),
}

/// One entry of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCall {
    pub kind: CallKind,
    pub id: ResourceId,
    pub outcome: CallOutcome,
}

/// Shared, append-only log of provider calls.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<ProviderCall>>>,
}

impl CallJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: ProviderCall) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Returns a copy of all recorded calls in call order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the recorded calls for one resource.
    pub fn calls_for(&self, id: &ResourceId) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|call| &call.id == id)
            .collect()
    }

    /// Counts calls of the given kind for one resource.
    pub fn count(&self, kind: CallKind, id: &ResourceId) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.kind == kind && &call.id == id)
            .count()
    }

    /// Total number of recorded calls.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A provider wrapper that journals every call.
///
/// Calls are recorded **after** the inner adapter returns, so the journal
/// reflects completed calls in completion order.
pub struct JournaledProvider<P: ProviderAdapter> {
    /// The inner provider implementation.
    inner: P,
    /// The shared journal.
    journal: CallJournal,
}

impl<P: ProviderAdapter> JournaledProvider<P> {
    /// Create a new journaled provider wrapper.
    pub fn new(inner: P, journal: CallJournal) -> Self {
        Self { inner, journal }
    }

    /// Get a reference to the inner provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Get a reference to the journal.
    pub fn journal(&self) -> &CallJournal {
        &self.journal
    }

    fn note<T>(&self, kind: CallKind, id: &ResourceId, result: &Result<T, ProviderError>) {
        let outcome = match result {
            Ok(_) => CallOutcome::Ok,
            Err(err) if self.inner.is_not_found(err) => CallOutcome::NotFound,
            Err(err) => CallOutcome::Failed(err.to_string()),
        };
        debug!(
            backend = self.inner.backend_name(),
            resource_id = %id,
            ?kind,
            ?outcome,
            "Provider call completed"
        );
        self.journal.record(ProviderCall {
            kind,
            id: id.clone(),
            outcome,
        });
    }
}

#[async_trait]
impl<P: ProviderAdapter> ProviderAdapter for JournaledProvider<P> {
    async fn apply(
        &self,
        id: &ResourceId,
        config: &DesiredConfiguration,
    ) -> Result<(), ProviderError> {
        let result = self.inner.apply(id, config).await;
        self.note(CallKind::Apply, id, &result);
        result
    }

    async fn fetch(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        let result = self.inner.fetch(id).await;
        self.note(CallKind::Fetch, id, &result);
        result
    }

    async fn destroy(&self, id: &ResourceId) -> Result<(), ProviderError> {
        let result = self.inner.destroy(id).await;
        self.note(CallKind::Destroy, id, &result);
        result
    }

    fn is_not_found(&self, error: &ProviderError) -> bool {
        self.inner.is_not_found(error)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<P: ProviderAdapter> std::fmt::Debug for JournaledProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledProvider")
            .field("backend", &self.inner.backend_name())
            .field("calls", &self.journal.len())
            .finish()
    }
}
