//! Implementation of the ProviderAdapter trait for InMemoryProvider.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use driftcheck_provider::{
    CallKind, DesiredConfiguration, ObservedState, ProviderAdapter, ProviderError, ResourceId,
};

use crate::faults::{Fault, FaultPlan};
use crate::options::{DeletionBehavior, MemoryProviderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deletion {
    Remaining(u32),
    Stuck,
}

#[derive(Debug, Clone)]
struct Entry {
    current: Value,
    /// Document served while `stale_reads` is non-zero.
    previous: Option<Value>,
    stale_reads: u32,
    deletion: Option<Deletion>,
}

/// In-memory managed-resource provider.
///
/// This provider stores one JSON document per resource and offers:
/// - Create-or-replace `apply` semantics
/// - Simulated eventual consistency for updates and deletions
/// - Scripted fault injection per operation
/// - Provider-specific not-found error codes
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    data: Arc<DashMap<ResourceId, Entry>>,
    faults: Arc<FaultPlan>,
    options: MemoryProviderOptions,
}

impl InMemoryProvider {
    /// Creates a strongly consistent provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with the given options.
    pub fn with_options(options: MemoryProviderOptions) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            faults: Arc::new(FaultPlan::default()),
            options,
        }
    }

    /// Schedules a fault.
    pub fn inject(&self, fault: Fault) {
        self.faults.push(fault);
    }

    /// Drops every pending fault.
    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    /// Returns `true` if the resource is stored, including resources pending deletion.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.data.contains_key(id)
    }

    /// Returns the latest applied document of a resource.
    pub fn document(&self, id: &ResourceId) -> Option<Value> {
        self.data.get(id).map(|entry| entry.current.clone())
    }

    /// Mutates the stored document behind the provider's back.
    ///
    /// Returns `false` if the resource does not exist.
    pub fn tamper(&self, id: &ResourceId, f: impl FnOnce(&mut Value)) -> bool {
        match self.data.get_mut(id) {
            Some(mut entry) => {
                f(&mut entry.current);
                true
            }
            None => false,
        }
    }

    /// Removes a resource without going through `destroy`.
    pub fn remove(&self, id: &ResourceId) -> bool {
        self.data.remove(id).is_some()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn not_found(&self, id: &ResourceId) -> ProviderError {
        match &self.options.not_found_code {
            Some(code) => ProviderError::remote(code, format!("{id} not found")),
            None => ProviderError::not_found(id.as_str()),
        }
    }

    async fn enter(&self, kind: CallKind, id: &ResourceId) -> Result<(), ProviderError> {
        if let Some(latency) = self.options.latency {
            tokio::time::sleep(latency).await;
        }
        match self.faults.check(kind, id) {
            Some(error) => {
                debug!(resource_id = %id, ?kind, %error, "Injected fault");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for InMemoryProvider {
    async fn apply(
        &self,
        id: &ResourceId,
        config: &DesiredConfiguration,
    ) -> Result<(), ProviderError> {
        self.enter(CallKind::Apply, id).await?;

        let mut document = config.document().clone();
        let Some(obj) = document.as_object_mut() else {
            return Err(ProviderError::rejected(
                "configuration must be a JSON object",
            ));
        };
        obj.insert("id".to_string(), Value::String(id.to_string()));
        if let Some(transform) = &self.options.transform {
            document = transform(id, document);
        }

        let lag = self.options.visibility_lag;
        match self.data.get_mut(id) {
            Some(mut entry) => {
                if entry.deletion.is_some() {
                    return Err(ProviderError::rejected(format!(
                        "{id} is being deleted"
                    )));
                }
                let previous = std::mem::replace(&mut entry.current, document);
                if lag > 0 {
                    entry.previous = Some(previous);
                    entry.stale_reads = lag;
                }
                debug!(resource_id = %id, stale_reads = lag, "Updated resource");
            }
            None => {
                self.data.insert(
                    id.clone(),
                    Entry {
                        current: document,
                        previous: None,
                        stale_reads: 0,
                        deletion: None,
                    },
                );
                debug!(resource_id = %id, "Created resource");
            }
        }
        Ok(())
    }

    async fn fetch(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        self.enter(CallKind::Fetch, id).await?;

        // Decide under the entry guard, remove after it is dropped.
        let view = {
            let Some(mut entry) = self.data.get_mut(id) else {
                return Err(self.not_found(id));
            };
            let deletion = entry.deletion;
            match deletion {
                Some(Deletion::Remaining(0)) => None,
                Some(Deletion::Remaining(n)) => {
                    entry.deletion = Some(Deletion::Remaining(n - 1));
                    Some(entry.current.clone())
                }
                Some(Deletion::Stuck) => Some(entry.current.clone()),
                None if entry.stale_reads > 0 => {
                    entry.stale_reads -= 1;
                    entry
                        .previous
                        .clone()
                        .or_else(|| Some(entry.current.clone()))
                }
                None => Some(entry.current.clone()),
            }
        };

        match view {
            Some(document) => ObservedState::from_document(&document),
            None => {
                self.data.remove(id);
                debug!(resource_id = %id, "Deletion propagated");
                Err(self.not_found(id))
            }
        }
    }

    async fn destroy(&self, id: &ResourceId) -> Result<(), ProviderError> {
        self.enter(CallKind::Destroy, id).await?;

        let immediate = {
            let Some(mut entry) = self.data.get_mut(id) else {
                return Err(self.not_found(id));
            };
            if entry.deletion.is_some() {
                return Ok(());
            }
            match self.options.deletion {
                DeletionBehavior::Immediate => true,
                DeletionBehavior::AfterFetches(n) => {
                    entry.deletion = Some(Deletion::Remaining(n));
                    false
                }
                DeletionBehavior::Never => {
                    entry.deletion = Some(Deletion::Stuck);
                    false
                }
            }
        };

        if immediate {
            self.data.remove(id);
        }
        debug!(resource_id = %id, immediate, "Deletion accepted");
        Ok(())
    }

    fn is_not_found(&self, error: &ProviderError) -> bool {
        error.is_not_found()
            || matches!(
                (&self.options.not_found_code, error.code()),
                (Some(expected), Some(actual)) if expected == actual
            )
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
