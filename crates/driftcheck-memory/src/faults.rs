//! Scripted fault injection for the in-memory provider.

use std::sync::{Mutex, PoisonError};

use driftcheck_provider::{CallKind, ProviderError, ResourceId};

/// A scripted failure returned instead of performing an operation.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Operation the fault applies to.
    pub kind: CallKind,
    /// Restricts the fault to one resource; `None` matches every resource.
    pub id: Option<ResourceId>,
    /// Number of matching calls to let through before the fault fires.
    pub skip: u32,
    /// Number of times the fault fires once armed.
    pub times: u32,
    /// The error returned while the fault fires.
    pub error: ProviderError,
}

impl Fault {
    /// Fails the next matching call once.
    pub fn once(kind: CallKind, error: ProviderError) -> Self {
        Self {
            kind,
            id: None,
            skip: 0,
            times: 1,
            error,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn after(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    /// Number of firings; at least one.
    pub fn times(mut self, times: u32) -> Self {
        self.times = times.max(1);
        self
    }

    pub fn forever(mut self) -> Self {
        self.times = u32::MAX;
        self
    }

    fn matches(&self, kind: CallKind, id: &ResourceId) -> bool {
        self.kind == kind && self.id.as_ref().is_none_or(|target| target == id)
    }
}

/// Ordered set of pending faults.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    faults: Mutex<Vec<Fault>>,
}

impl FaultPlan {
    pub(crate) fn push(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault);
    }

    pub(crate) fn clear(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Consumes one call against the plan and returns the error to report, if any.
    ///
    /// Only the first matching fault observes the call.
    pub(crate) fn check(&self, kind: CallKind, id: &ResourceId) -> Option<ProviderError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        // A fault built with `times: 0` through its public field never fires.
        faults.retain(|f| f.times > 0);
        let index = faults.iter().position(|f| f.matches(kind, id))?;
        let fault = &mut faults[index];

        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }

        let error = fault.error.clone();
        if fault.times != u32::MAX {
            fault.times = fault.times.saturating_sub(1);
        }
        if fault.times == 0 {
            faults.remove(index);
        }
        Some(error)
    }
}
