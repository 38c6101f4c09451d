//! Validation of JSON configuration against a [`Schema`].
//!
//! This only checks structure: presence of required attributes, value types
//! and block counts. Resources add their own rules on top (see
//! `Resource::validate`).
//!
//! # Example
//!
//! ```
//! use grafana_provider::schema::{Attribute, Schema};
//! use grafana_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("title", Attribute::required_string())
//!     .with_attribute("org_id", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"title": "Alerts"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"title": "Alerts", "org_id": "two"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("org_id"));
//! ```

use serde_json::Value;

use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};

/// Validate `value` against `schema`. An empty result means valid.
///
/// - required attributes must be present and non-null;
/// - computed-only attributes are not checked;
/// - values must match their declared type;
/// - nested blocks respect their item limits and are checked recursively.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element) | AttributeType::Set(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => {
                let expected = if matches!(attr_type, AttributeType::Set(_)) {
                    "set"
                } else {
                    "list"
                };
                diagnostics.push(type_error(path, expected, value));
            },
        },
        AttributeType::Map(element) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    validate_type(element, item, &format!("{}.{}", path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Dynamic => {},
    }
}

/// Blocks are arrays of objects; a single block may also be given as a bare
/// object.
fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: &[Value] = match value {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items,
        Some(obj @ Value::Object(_)) if nested.nesting_mode == BlockNestingMode::Single => {
            std::slice::from_ref(obj)
        },
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        },
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        let summary = if nested.nesting_mode == BlockNestingMode::Single {
            format!("Missing required block '{}'", path)
        } else {
            format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            )
        };
        diagnostics.push(Diagnostic::error(summary).with_attribute(path));
    }
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in items.iter().enumerate() {
        validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
    }
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn rule_group_like() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("interval_seconds", Attribute::required_int64())
            .with_block(
                "rule",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("name", Attribute::required_string())
                        .with_attribute("labels", Attribute::string_map())
                        .with_block(
                            "data",
                            NestedBlock::list(
                                Block::new()
                                    .with_attribute("ref_id", Attribute::required_string())
                                    .with_block(
                                        "relative_time_range",
                                        NestedBlock::single(
                                            Block::new()
                                                .with_attribute("from", Attribute::required_int64())
                                                .with_attribute("to", Attribute::required_int64()),
                                        )
                                        .with_min_items(1),
                                    ),
                            )
                            .with_min_items(1),
                        ),
                )
                .with_min_items(1),
            )
    }

    fn valid_group() -> Value {
        json!({
            "name": "My Rule Group",
            "interval_seconds": 240,
            "rule": [{
                "name": "My Alert Rule 1",
                "labels": {"team": "ops"},
                "data": [{
                    "ref_id": "A",
                    "relative_time_range": [{"from": 600, "to": 0}]
                }]
            }]
        })
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&rule_group_like(), &valid_group()).is_empty());
    }

    #[test]
    fn test_missing_required() {
        let diagnostics = validate(&rule_group_like(), &json!({"interval_seconds": 60, "rule": [valid_group()["rule"][0].clone()]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));

        let diagnostics = validate(&rule_group_like(), &json!({"name": null, "interval_seconds": 60, "rule": valid_group()["rule"].clone()}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_computed_attribute_skipped() {
        let mut config = valid_group();
        config["id"] = json!(42);
        assert!(validate(&rule_group_like(), &config).is_empty());
    }

    #[test]
    fn test_type_errors() {
        let mut config = valid_group();
        config["interval_seconds"] = json!("60");
        config["rule"][0]["labels"] = json!({"team": 1});
        let diagnostics = validate(&rule_group_like(), &config);
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.clone())
            .collect();
        assert!(paths.contains(&"interval_seconds".to_string()));
        assert!(paths.contains(&"rule.0.labels.team".to_string()));
    }

    #[test]
    fn test_int64_accepts_integral_floats() {
        let schema = Schema::v0().with_attribute("n", Attribute::optional_int64());
        assert!(validate(&schema, &json!({"n": 60.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"n": 1.5})).len(), 1);
    }

    #[test]
    fn test_min_items() {
        let mut config = valid_group();
        config["rule"] = json!([]);
        let diagnostics = validate(&rule_group_like(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));
    }

    #[test]
    fn test_single_block_limits() {
        let mut config = valid_group();
        config["rule"][0]["data"][0]["relative_time_range"] =
            json!([{"from": 1, "to": 0}, {"from": 2, "to": 0}]);
        let diagnostics = validate(&rule_group_like(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("rule.0.data.0.relative_time_range")
        );

        config["rule"][0]["data"][0]["relative_time_range"] = json!(null);
        let diagnostics = validate(&rule_group_like(), &config);
        assert!(diagnostics[0].summary.starts_with("Missing required block"));
    }

    #[test]
    fn test_single_block_as_object() {
        let mut config = valid_group();
        config["rule"][0]["data"][0]["relative_time_range"] = json!({"from": 600, "to": 0});
        assert!(validate(&rule_group_like(), &config).is_empty());
    }

    #[test]
    fn test_deeply_nested_error_path() {
        let mut config = valid_group();
        config["rule"][0]["data"][0]["relative_time_range"][0]["from"] = json!("ten minutes");
        let diagnostics = validate(&rule_group_like(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("rule.0.data.0.relative_time_range.0.from")
        );
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&rule_group_like(), &json!("nope"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_dynamic_accepts_anything() {
        let schema = Schema::v0().with_attribute("model", Attribute::new(AttributeType::Dynamic, crate::schema::AttributeFlags::optional()));
        assert!(validate(&schema, &json!({"model": {"refId": "A"}})).is_empty());
        assert!(validate(&schema, &json!({"model": [1, "two"]})).is_empty());
    }
}
