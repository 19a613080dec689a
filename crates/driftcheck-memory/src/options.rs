use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use driftcheck_provider::ResourceId;
use serde_json::Value;

/// Hook applied to every configuration document before it is stored.
///
/// Used to add computed attributes (endpoints, ARNs) or to simulate a
/// provider that silently drops part of the desired state.
pub type DocumentTransform = Arc<dyn Fn(&ResourceId, Value) -> Value + Send + Sync>;

/// What happens to a resource after `destroy` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionBehavior {
    /// The resource disappears immediately.
    #[default]
    Immediate,
    /// The resource keeps being reported for the given number of fetches.
    AfterFetches(u32),
    /// The resource never disappears (a stuck deletion).
    Never,
}

/// Behavior knobs of the in-memory provider.
///
/// Defaults describe a strongly consistent provider without latency.
#[derive(Clone, Default)]
pub struct MemoryProviderOptions {
    /// Number of fetches after an update that still return the previous document.
    pub visibility_lag: u32,
    /// How deletions propagate.
    pub deletion: DeletionBehavior,
    /// Provider-specific not-found code. When set, absence is reported as a
    /// `ProviderError::Remote` with this code instead of `ProviderError::NotFound`.
    pub not_found_code: Option<String>,
    /// Simulated latency of every call.
    pub latency: Option<Duration>,
    /// Transform applied to documents on apply.
    pub transform: Option<DocumentTransform>,
}

impl MemoryProviderOptions {
    pub fn with_visibility_lag(mut self, fetches: u32) -> Self {
        self.visibility_lag = fetches;
        self
    }

    pub fn with_deletion(mut self, deletion: DeletionBehavior) -> Self {
        self.deletion = deletion;
        self
    }

    pub fn with_not_found_code(mut self, code: impl Into<String>) -> Self {
        self.not_found_code = Some(code.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&ResourceId, Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for MemoryProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProviderOptions")
            .field("visibility_lag", &self.visibility_lag)
            .field("deletion", &self.deletion)
            .field("not_found_code", &self.not_found_code)
            .field("latency", &self.latency)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
