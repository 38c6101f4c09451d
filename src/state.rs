//! Accessors for JSON resource state.
//!
//! State and configuration arrive as `serde_json::Value` objects: attributes
//! are keys, nested blocks are arrays of objects. These helpers read them with
//! the zero-value semantics the host uses for unset attributes.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

pub(crate) fn str_attr<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// A string attribute, `None` when unset or empty.
pub(crate) fn opt_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Integers may also arrive as numeric strings (`org_id = "2"`).
pub(crate) fn i64_attr(value: &Value, key: &str) -> i64 {
    match value.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

pub(crate) fn f64_attr(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or_default()
}

pub(crate) fn bool_attr(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or_default()
}

/// Items of a list block or list attribute.
pub(crate) fn list_attr<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// The item of a single block, given either as a one-element array or as a
/// bare object.
pub(crate) fn single_block<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value.get(key)? {
        Value::Array(items) => items.first().filter(|item| item.is_object()),
        obj @ Value::Object(_) => Some(obj),
        _ => None,
    }
}

pub(crate) fn string_map(value: &Value, key: &str) -> BTreeMap<String, String> {
    value
        .get(key)
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn string_set(value: &Value, key: &str) -> BTreeSet<String> {
    list_attr(value, key)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

pub(crate) fn string_list(value: &Value, key: &str) -> Vec<String> {
    list_attr(value, key)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// A JSON object from a string map; empty maps become `null` so that an
/// unset attribute and an empty map compare equal.
pub(crate) fn map_value(map: &BTreeMap<String, String>) -> Value {
    if map.is_empty() {
        return Value::Null;
    }
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<String, Value>>(),
    )
}

/// Whether a value counts as unset: `null`, `""`, `false`, `0`, or an empty
/// array or object.
pub(crate) fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_accessors() {
        let state = json!({
            "name": "prom",
            "empty": "",
            "org_id": "2",
            "interval_seconds": 240,
            "value": 0.995,
            "is_default": true
        });
        assert_eq!(str_attr(&state, "name"), "prom");
        assert_eq!(str_attr(&state, "missing"), "");
        assert_eq!(opt_str(&state, "empty"), None);
        assert_eq!(i64_attr(&state, "org_id"), 2);
        assert_eq!(i64_attr(&state, "interval_seconds"), 240);
        assert_eq!(i64_attr(&state, "name"), 0);
        assert_eq!(f64_attr(&state, "value"), 0.995);
        assert!(bool_attr(&state, "is_default"));
        assert!(!bool_attr(&state, "missing"));
    }

    #[test]
    fn test_single_block_forms() {
        let as_list = json!({"query": [{"type": "freeform"}]});
        let as_object = json!({"query": {"type": "freeform"}});
        let empty = json!({"query": []});
        assert_eq!(str_attr(single_block(&as_list, "query").unwrap(), "type"), "freeform");
        assert_eq!(str_attr(single_block(&as_object, "query").unwrap(), "type"), "freeform");
        assert!(single_block(&empty, "query").is_none());
        assert!(single_block(&empty, "missing").is_none());
    }

    #[test]
    fn test_collections() {
        let state = json!({
            "labels": {"team": "ops", "bad": 1},
            "admins": ["b@example.com", "a@example.com", "a@example.com"]
        });
        let labels = string_map(&state, "labels");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["team"], "ops");
        let admins: Vec<_> = string_set(&state, "admins").into_iter().collect();
        assert_eq!(admins, vec!["a@example.com", "b@example.com"]);
        assert_eq!(string_list(&state, "admins").len(), 3);
        assert_eq!(map_value(&BTreeMap::new()), Value::Null);
    }

    #[test]
    fn test_is_unset() {
        for unset in [json!(null), json!(""), json!(false), json!(0), json!(0.0), json!([]), json!({})] {
            assert!(is_unset(&unset), "{}", unset);
        }
        for set in [json!("x"), json!(true), json!(1), json!([1]), json!({"a": 1})] {
            assert!(!is_unset(&set), "{}", set);
        }
    }
}
