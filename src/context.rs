//! Execution context resolution
//!
//! Context flows from three layers: the chain, the ETL spec and the chain
//! step. Layers are combined key by key with later layers winning; nested
//! values are replaced whole, never merged.

use serde_json::{Map, Value};

/// Effective read-only context for one ETL application, exposed to queries
/// as `$ctx`
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    value: Value,
}

impl ExecutionContext {
    /// Context holding exactly `entries`
    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self {
            value: Value::Object(entries),
        }
    }

    /// The context as a JSON object
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Look up one key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    /// Whether no key is set
    pub fn is_empty(&self) -> bool {
        self.value.as_object().is_none_or(Map::is_empty)
    }

    /// Take the underlying object
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::from_map(Map::new())
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(entries: Map<String, Value>) -> Self {
        Self::from_map(entries)
    }
}

/// Combine context layers with precedence `chain < etl < step`
///
/// # Examples
///
/// ```rust
/// use jtl::context::resolve;
/// use serde_json::json;
///
/// let chain = json!({"a": 1, "b": 1});
/// let step = json!({"b": 2});
/// let ctx = resolve(chain.as_object(), None, step.as_object());
/// assert_eq!(ctx.as_value(), &json!({"a": 1, "b": 2}));
/// ```
pub fn resolve(
    chain: Option<&Map<String, Value>>,
    etl: Option<&Map<String, Value>>,
    step: Option<&Map<String, Value>>,
) -> ExecutionContext {
    let mut merged = Map::new();
    for layer in [chain, etl, step].into_iter().flatten() {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    ExecutionContext::from_map(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_step_beats_etl_beats_chain() {
        let chain = object(json!({"x": 1}));
        let etl = object(json!({"x": 2}));
        let step = object(json!({"x": 3}));

        assert_eq!(resolve(Some(&chain), Some(&etl), Some(&step)).get("x"), Some(&json!(3)));
        assert_eq!(resolve(Some(&chain), Some(&etl), None).get("x"), Some(&json!(2)));
        assert_eq!(resolve(Some(&chain), None, None).get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_layers_union_their_keys() {
        let chain = object(json!({"a": 1}));
        let step = object(json!({"b": 2}));
        let ctx = resolve(Some(&chain), None, Some(&step));
        assert_eq!(ctx.into_value(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_nested_values_are_replaced_not_merged() {
        let chain = object(json!({"n": {"a": 1, "b": 1}}));
        let step = object(json!({"n": {"b": 2}}));
        let ctx = resolve(Some(&chain), None, Some(&step));
        assert_eq!(ctx.get("n"), Some(&json!({"b": 2})));
    }

    #[test]
    fn test_no_layers_is_empty() {
        let ctx = resolve(None, None, None);
        assert!(ctx.is_empty());
        assert_eq!(ctx, ExecutionContext::default());
    }
}
