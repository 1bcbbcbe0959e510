//! Request context values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Value;

/// The free-form `context` record of a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RequestContext(BTreeMap<String, Value>);

impl RequestContext {
    /// Create an empty request context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one context attribute and return the updated context.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert one context attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true when there are no context attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of context attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over context attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The context as the record value bound to the `context` variable.
    pub fn to_record(&self) -> Value {
        Value::Record(self.0.clone())
    }
}

impl From<BTreeMap<String, Value>> for RequestContext {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self(value)
    }
}

impl From<RequestContext> for BTreeMap<String, Value> {
    fn from(value: RequestContext) -> Self {
        value.0
    }
}

impl<'a> IntoIterator for &'a RequestContext {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_to_record() {
        let context = RequestContext::new()
            .with_attr("ticket", 42_i64)
            .with_attr("env", "prod");

        let record = context.to_record();
        let fields = record.as_record().unwrap();
        assert_eq!(fields["ticket"], Value::Long(42));
        assert_eq!(fields["env"], Value::from("prod"));
    }

    #[test]
    fn test_request_context_insert_and_len() {
        let mut context = RequestContext::new();
        assert!(context.is_empty());

        context.insert("a", true);
        context.insert("b", 1_i64);

        assert_eq!(context.len(), 2);
        assert_eq!(context.get("a"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_request_context_json() {
        let context: RequestContext = serde_json::from_value(serde_json::json!({
            "mfa": true,
            "source": { "__extn": { "fn": "ip", "arg": "10.0.0.1" } }
        }))
        .unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context.get("source").unwrap().type_name(), "ipaddr");
    }
}
