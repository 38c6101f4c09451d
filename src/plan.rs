//! Plan computation shared by every resource.
//!
//! Planning never calls Grafana. It applies schema defaults, lets the
//! resource normalize the planned state, carries computed attributes over
//! from the prior state and diffs the result.

use serde_json::{Map, Value};

use crate::resources::Resource;
use crate::schema::{AttributeType, Block, BlockNestingMode};
use crate::state::is_unset;
use crate::types::{AttributeChange, PlanResult};

/// Plan `proposed` against `prior` for `resource`. A null `proposed` plans a
/// destroy; a missing or null `prior` plans a create.
pub fn plan_resource(resource: &dyn Resource, prior: Option<&Value>, proposed: Value) -> PlanResult {
    let schema = resource.schema();
    let prior = prior.filter(|p| !p.is_null());

    if proposed.is_null() {
        let id = prior
            .and_then(|p| p.get("id"))
            .cloned()
            .unwrap_or(Value::Null);
        return PlanResult::with_changes(Value::Null, vec![AttributeChange::removed("id", id)], false);
    }

    let mut planned = proposed;
    prepare_block(&schema.block, &mut planned);
    resource.normalize(&mut planned);

    let Some(prior) = prior else {
        let changes = planned
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !is_unset(v))
                    .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(planned, changes, false);
    };

    carry_computed(&schema.block, prior, &mut planned);

    let mut changes = Vec::new();
    let mut requires_replace = false;
    for (name, attr) in &schema.block.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        let before = prior.get(name).unwrap_or(&Value::Null);
        let after = planned.get(name).unwrap_or(&Value::Null);
        if !values_equal(before, after) {
            requires_replace |= attr.force_new;
            changes.push(AttributeChange::modified(name.clone(), before.clone(), after.clone()));
        }
    }
    for name in schema.block.blocks.keys() {
        let before = prior.get(name).unwrap_or(&Value::Null);
        let after = planned.get(name).unwrap_or(&Value::Null);
        if !values_equal(before, after) {
            changes.push(AttributeChange::modified(name.clone(), before.clone(), after.clone()));
        }
    }

    if changes.is_empty() {
        return PlanResult::no_change(planned);
    }

    // A replacement gets fresh computed values from Grafana.
    if requires_replace {
        if let Some(obj) = planned.as_object_mut() {
            for (name, attr) in &schema.block.attributes {
                if attr.flags.is_computed_only() {
                    obj.insert(name.clone(), Value::Null);
                }
            }
        }
    }

    PlanResult::with_changes(planned, changes, requires_replace)
}

/// Fill defaults, sort sets and turn bare single blocks into one-element
/// lists, recursively.
fn prepare_block(block: &Block, value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    for (name, attr) in &block.attributes {
        if let Some(default) = &attr.default {
            let unset = obj.get(name).map_or(true, Value::is_null);
            if unset {
                obj.insert(name.clone(), default.clone());
            }
        }
        if let (AttributeType::Set(_), Some(Value::Array(items))) =
            (&attr.attr_type, obj.get_mut(name))
        {
            sort_set(items);
        }
    }

    for (name, nested) in &block.blocks {
        let Some(entry) = obj.get_mut(name) else {
            continue;
        };
        if entry.is_object() && nested.nesting_mode == BlockNestingMode::Single {
            let item = entry.take();
            *entry = Value::Array(vec![item]);
        }
        if let Value::Array(items) = entry {
            for item in items.iter_mut() {
                prepare_block(&nested.block, item);
            }
        }
    }
}

fn sort_set(items: &mut Vec<Value>) {
    items.sort_by_key(|v| v.to_string());
    items.dedup();
}

/// Attributes that identify a nested block item across plans.
const ITEM_KEYS: [&str; 2] = ["name", "ref_id"];

/// Computed attributes left unset by the configuration keep their prior
/// value. Nested block items are matched by `name` or `ref_id` when they
/// have one, otherwise by position.
fn carry_computed(block: &Block, prior: &Value, planned: &mut Value) {
    let Some(obj) = planned.as_object_mut() else {
        return;
    };

    for (name, attr) in &block.attributes {
        if !attr.flags.computed {
            continue;
        }
        let unset = obj.get(name).map_or(true, is_unset);
        match prior.get(name) {
            Some(previous) if unset && !previous.is_null() => {
                obj.insert(name.clone(), previous.clone());
            },
            _ => {},
        }
    }

    for (name, nested) in &block.blocks {
        let (Some(Value::Array(prior_items)), Some(Value::Array(items))) =
            (prior.get(name), obj.get_mut(name))
        else {
            continue;
        };
        for (i, item) in items.iter_mut().enumerate() {
            if let Some(previous) = matching_item(prior_items, item, i) {
                carry_computed(&nested.block, previous, item);
            }
        }
    }
}

fn item_key(item: &Value) -> Option<(&'static str, &str)> {
    ITEM_KEYS.iter().find_map(|key| {
        item.get(*key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(|v| (*key, v))
    })
}

/// The prior item `item` continues. A keyed item only continues a prior item
/// with the same key, so removing an item never shifts its computed values
/// onto its neighbour.
fn matching_item<'a>(prior_items: &'a [Value], item: &Value, index: usize) -> Option<&'a Value> {
    match item_key(item) {
        Some((key, value)) => prior_items
            .iter()
            .find(|p| p.get(key).and_then(Value::as_str) == Some(value)),
        None => prior_items.get(index),
    }
}

/// Structural equality where every unset form is equal and numbers compare by
/// value.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        _ if is_unset(a) && is_unset(b) => true,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        },
        (Value::Object(xs), Value::Object(ys)) => objects_equal(xs, ys),
        _ => a == b,
    }
}

fn objects_equal(xs: &Map<String, Value>, ys: &Map<String, Value>) -> bool {
    xs.keys().chain(ys.keys()).all(|key| {
        values_equal(
            xs.get(key).unwrap_or(&Value::Null),
            ys.get(key).unwrap_or(&Value::Null),
        )
    })
}
