//! Predicates over observed state.
//!
//! Every assertion is evaluated independently: [`evaluate`] never stops at
//! the first violation, so one verification pass reports every expectation
//! that does not hold.

use std::fmt;
use std::sync::Arc;

use driftcheck_provider::{ObservedState, canonical_value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied check. An `Err` message becomes the failure's actual value.
pub type CustomCheck = Arc<dyn Fn(&ObservedState) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub enum Predicate {
    /// Attribute equals the expected canonical value.
    Equals { key: String, expected: String },
    /// Attribute is present and non-empty.
    Present { key: String },
    /// Attribute matches the pattern.
    Matches { key: String, pattern: Regex },
    /// Keyed collection or list has exactly `expected` entries.
    Count { key: String, expected: usize },
    /// Attribute is not present.
    Absent { key: String },
    Custom(CustomCheck),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, expected } => write!(f, "Equals({key} = {expected:?})"),
            Self::Present { key } => write!(f, "Present({key})"),
            Self::Matches { key, pattern } => write!(f, "Matches({key} ~ /{pattern}/)"),
            Self::Count { key, expected } => write!(f, "Count({key} = {expected})"),
            Self::Absent { key } => write!(f, "Absent({key})"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A predicate tagged with a human-readable description.
#[derive(Debug, Clone)]
pub struct Assertion {
    description: String,
    predicate: Predicate,
}

impl Assertion {
    /// `key` must equal `expected` after canonicalization: both `3` and `"3"`
    /// match a stored numeric 3.
    pub fn equals(key: impl Into<String>, expected: impl Into<Value>) -> Self {
        let key = key.into();
        let expected = expected.into();
        let expected = canonical_value(&expected).unwrap_or_else(|| expected.to_string());
        Self {
            description: format!("{key} = {expected:?}"),
            predicate: Predicate::Equals { key, expected },
        }
    }

    pub fn present(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            description: format!("{key} is set"),
            predicate: Predicate::Present { key },
        }
    }

    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn matches(key: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::matching(key, Regex::new(pattern)?))
    }

    pub fn matching(key: impl Into<String>, pattern: Regex) -> Self {
        let key = key.into();
        Self {
            description: format!("{key} matches /{pattern}/"),
            predicate: Predicate::Matches { key, pattern },
        }
    }

    pub fn count(key: impl Into<String>, expected: usize) -> Self {
        let key = key.into();
        Self {
            description: format!("{key} has {expected} entries"),
            predicate: Predicate::Count { key, expected },
        }
    }

    pub fn absent(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            description: format!("{key} is not set"),
            predicate: Predicate::Absent { key },
        }
    }

    pub fn custom<F>(description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ObservedState) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Predicate::Custom(Arc::new(check)),
        }
    }

    /// Replaces the generated description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Checks the assertion against one snapshot.
    pub fn check(&self, state: &ObservedState) -> Result<(), Failure> {
        let fail = |key: Option<&String>, expected: String, actual: Option<String>| Failure {
            description: self.description.clone(),
            key: key.cloned(),
            expected,
            actual,
        };

        match &self.predicate {
            Predicate::Equals { key, expected } => match state.get(key) {
                Some(actual) if actual == expected => Ok(()),
                actual => Err(fail(Some(key), expected.clone(), actual.map(str::to_string))),
            },
            Predicate::Present { key } => {
                let set = state.get(key).is_some_and(|v| !v.is_empty())
                    || state.collection_len(key).is_some_and(|n| n > 0);
                if set {
                    Ok(())
                } else {
                    Err(fail(
                        Some(key),
                        "a non-empty value".to_string(),
                        state.get(key).map(str::to_string),
                    ))
                }
            }
            Predicate::Matches { key, pattern } => match state.get(key) {
                Some(actual) if pattern.is_match(actual) => Ok(()),
                actual => Err(fail(
                    Some(key),
                    format!("/{pattern}/"),
                    actual.map(str::to_string),
                )),
            },
            Predicate::Count { key, expected } => {
                let actual = state.collection_len(key).unwrap_or(0);
                if actual == *expected {
                    Ok(())
                } else {
                    Err(fail(Some(key), expected.to_string(), Some(actual.to_string())))
                }
            }
            Predicate::Absent { key } => match state.get(key) {
                None => Ok(()),
                Some(actual) => Err(fail(
                    Some(key),
                    "no value".to_string(),
                    Some(actual.to_string()),
                )),
            },
            Predicate::Custom(check) => check(state)
                .map_err(|message| fail(None, "check to pass".to_string(), Some(message))),
        }
    }
}

/// One violated assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub description: String,
    /// Attribute the assertion inspected; `None` for custom checks.
    pub key: Option<String>,
    pub expected: String,
    /// Observed value, `None` if the attribute was absent.
    pub actual: Option<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "{}: expected {}, got {actual:?}",
                self.description, self.expected
            ),
            None => write!(
                f,
                "{}: expected {}, attribute absent",
                self.description, self.expected
            ),
        }
    }
}

/// Evaluates every assertion against the snapshot and returns all failures in
/// declaration order.
pub fn evaluate(state: &ObservedState, assertions: &[Assertion]) -> Vec<Failure> {
    assertions
        .iter()
        .filter_map(|assertion| assertion.check(state).err())
        .collect()
}
