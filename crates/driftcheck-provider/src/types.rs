//! Data types shared by providers and the harness.
//!
//! The observed state is stored in flattened form: every leaf of the
//! provider's JSON document becomes one `key -> value` attribute. Nested
//! objects use dotted keys, keyed collections record their size under
//! `<key>.%` and lists record their length under `<key>.#`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// Suffix of the attribute holding the number of entries of a keyed collection.
pub const MAP_COUNT_SUFFIX: &str = "%";

/// Suffix of the attribute holding the number of items of a list.
pub const LIST_COUNT_SUFFIX: &str = "#";

/// Opaque identifier of one remote resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identifier of the form `<prefix>-<random suffix>`.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{prefix}-{}", &suffix[..12]))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Declarative description of the desired state for one step.
///
/// The harness never looks inside the document; only the provider adapter
/// interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredConfiguration(Value);

impl DesiredConfiguration {
    /// Creates a configuration from a JSON document.
    #[must_use]
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    /// Returns the underlying document.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.0
    }

    /// Consumes the configuration and returns the document.
    #[must_use]
    pub fn into_document(self) -> Value {
        self.0
    }
}

impl From<Value> for DesiredConfiguration {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Snapshot of remote attributes returned by a provider at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    attributes: BTreeMap<String, String>,
}

impl ObservedState {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens a JSON object into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Internal` if the document is not a JSON object.
    pub fn from_document(document: &Value) -> Result<Self, ProviderError> {
        let Value::Object(map) = document else {
            return Err(ProviderError::internal(
                "observed document must be a JSON object",
            ));
        };

        let mut attributes = BTreeMap::new();
        for (key, value) in map {
            flatten_into(key, value, &mut attributes);
        }
        Ok(Self { attributes })
    }

    /// Builds a snapshot from already flattened attributes.
    pub fn from_attributes<K, V>(attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns `true` if the attribute is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Returns the number of entries of a keyed collection or list.
    ///
    /// Returns `None` if neither `<key>.%` nor `<key>.#` is present.
    #[must_use]
    pub fn collection_len(&self, key: &str) -> Option<usize> {
        [MAP_COUNT_SUFFIX, LIST_COUNT_SUFFIX]
            .iter()
            .find_map(|suffix| self.get(&format!("{key}.{suffix}")))
            .and_then(|count| count.parse().ok())
    }

    /// Number of flattened attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` if no attribute is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterates over all attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders a scalar JSON value the way it appears in an [`ObservedState`].
///
/// Returns `None` for `null`, objects and arrays.
#[must_use]
pub fn canonical_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            let present = map.values().filter(|v| !v.is_null()).count();
            out.insert(format!("{prefix}.{MAP_COUNT_SUFFIX}"), present.to_string());
            for (key, nested) in map {
                flatten_into(&format!("{prefix}.{key}"), nested, out);
            }
        }
        Value::Array(items) => {
            out.insert(format!("{prefix}.{LIST_COUNT_SUFFIX}"), items.len().to_string());
            for (index, nested) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}.{index}"), nested, out);
            }
        }
        scalar => {
            if let Some(rendered) = canonical_value(scalar) {
                out.insert(prefix.to_string(), rendered);
            }
        }
    }
}
