//! Per-request scratch data shared along the plugin chain.

use std::collections::HashMap;

use serde_json::Value;

/// Route parameters in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Params as a JSON object, handy for echoing them back.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Scratch map populated once before dispatch, then open to plugins.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    /// Buffered request body, decoded as (lossy) UTF-8. `None` when empty.
    pub body: Option<String>,
    /// Params of the matched route.
    pub params: Params,
    values: HashMap<String, Value>,
}

impl Locals {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_keep_order_and_lookup() {
        let params: Params = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("c"), None);
        assert_eq!(params.iter().map(|(k, _)| k).collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(params.to_json(), serde_json::json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn locals_store_arbitrary_values() {
        let mut locals = Locals::default();
        assert!(locals.insert("user", "ada").is_none());
        locals.insert("visits", 3);
        assert_eq!(locals.get("user"), Some(&Value::from("ada")));
        assert!(locals.contains("visits"));
        assert_eq!(locals.remove("visits"), Some(Value::from(3)));
    }
}
