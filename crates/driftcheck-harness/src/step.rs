use std::fmt;
use std::sync::Arc;

use driftcheck_provider::{DesiredConfiguration, ResourceId};

use crate::assertion::Assertion;

/// Environment check run before anything is applied, e.g. credentials present.
pub type PreCheck = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// One desired configuration plus the assertions that must hold once it is applied.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: Option<String>,
    pub config: DesiredConfiguration,
    pub assertions: Vec<Assertion>,
}

impl Step {
    pub fn new(config: impl Into<DesiredConfiguration>) -> Self {
        Self {
            name: None,
            config: config.into(),
            assertions: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn check(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn checks(mut self, assertions: impl IntoIterator<Item = Assertion>) -> Self {
        self.assertions.extend(assertions);
        self
    }
}

/// An ordered sequence of steps against one resource.
#[derive(Clone)]
pub struct TestCase {
    pub id: ResourceId,
    pub steps: Vec<Step>,
    pub precheck: Option<PreCheck>,
}

impl TestCase {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            precheck: None,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn precheck<F>(mut self, check: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.precheck = Some(Arc::new(check));
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("steps", &self.steps)
            .field("precheck", &self.precheck.is_some())
            .finish()
    }
}
