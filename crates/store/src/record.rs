//! Attribute-map records.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// A stored item: a flat map of named attributes.
///
/// Attribute values are JSON values; the condition grammar in
/// [`crate::Condition`] compares them structurally, with numeric comparisons
/// for integer-valued attributes (timestamps, counters, nonces).
#[derive(Debug, Clone, PartialEq, Default, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Sets an attribute, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(attr.into(), value.into());
        self
    }

    /// Sets an attribute in place.
    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(attr.into(), value.into());
    }

    /// Removes an attribute.
    pub fn remove(&mut self, attr: &str) -> Option<Value> {
        self.0.remove(attr)
    }

    /// Returns the raw attribute value.
    #[must_use]
    pub fn get(&self, attr: &str) -> Option<&Value> {
        // Null attributes count as absent, matching conditional semantics.
        self.0.get(attr).filter(|v| !v.is_null())
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn get_str(&self, attr: &str) -> Option<&str> {
        self.get(attr).and_then(Value::as_str)
    }

    /// Returns an integer attribute.
    #[must_use]
    pub fn get_i64(&self, attr: &str) -> Option<i64> {
        self.get(attr).and_then(Value::as_i64)
    }

    /// Returns a non-negative integer attribute.
    #[must_use]
    pub fn get_u64(&self, attr: &str) -> Option<u64> {
        self.get(attr).and_then(Value::as_u64)
    }

    /// Returns a boolean attribute.
    #[must_use]
    pub fn get_bool(&self, attr: &str) -> Option<bool> {
        self.get(attr).and_then(Value::as_bool)
    }

    /// True if the attribute is present and non-null.
    #[must_use]
    pub fn has(&self, attr: &str) -> bool {
        self.get(attr).is_some()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the record has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes a value into an attribute (for nested payloads such as
    /// member lists).
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn set_json<T: Serialize>(
        &mut self,
        attr: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<()> {
        self.0.insert(attr.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Deserializes an attribute into a typed value.
    ///
    /// Returns `None` when the attribute is absent.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` deserialization failures for present values.
    pub fn get_json<T: DeserializeOwned>(&self, attr: &str) -> serde_json::Result<Option<T>> {
        match self.get(attr) {
            Some(value) => serde_json::from_value(value.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Iterates over attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let record = Record::new()
            .with("name", "alice")
            .with("count", 3)
            .with("flag", true);
        assert_eq!(record.get_str("name"), Some("alice"));
        assert_eq!(record.get_i64("count"), Some(3));
        assert_eq!(record.get_bool("flag"), Some(true));
        assert_eq!(record.get_str("missing"), None);
    }

    #[test]
    fn null_counts_as_absent() {
        let record = Record::new().with("gone", Value::Null);
        assert!(!record.has("gone"));
        assert_eq!(record.get("gone"), None);
    }

    #[test]
    fn json_round_trip() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Payload {
            items: Vec<u32>,
        }
        let mut record = Record::new();
        record
            .set_json("payload", &Payload { items: vec![1, 2, 3] })
            .unwrap();
        let back: Option<Payload> = record.get_json("payload").unwrap();
        assert_eq!(back, Some(Payload { items: vec![1, 2, 3] }));
        let missing: Option<Payload> = record.get_json("other").unwrap();
        assert!(missing.is_none());
    }
}
