//! Plan, import and metadata types exchanged with the host.
//!
//! These are the JSON-valued counterparts of the protocol messages in
//! [`crate::protocol`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol;

/// A change to one attribute in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute path, e.g. `name` or `rule`.
    pub path: String,
    /// The value before the change (`None` when the attribute is new).
    pub before: Option<Value>,
    /// The value after the change (`None` when the attribute goes away).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// A change with explicit before and after values.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// A new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// A removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// A modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

fn encode(value: Option<&Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(v).ok())
        .unwrap_or_default()
}

fn decode(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

impl From<protocol::AttributeChange> for AttributeChange {
    fn from(proto: protocol::AttributeChange) -> Self {
        Self {
            path: proto.path,
            before: decode(&proto.before),
            after: decode(&proto.after),
        }
    }
}

impl From<AttributeChange> for protocol::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            before: encode(change.before.as_ref()),
            after: encode(change.after.as_ref()),
            path: change.path,
        }
    }
}

/// Outcome of planning one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State expected after apply; `null` when the resource is destroyed.
    pub planned_state: Value,
    /// Attribute-level changes.
    pub changes: Vec<AttributeChange>,
    /// The remote object must be destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    /// A plan that changes nothing.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// A resource brought under management by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Resource type name.
    pub resource_type: String,
    /// The state read from Grafana.
    pub state: Value,
}

impl ImportedResource {
    /// An imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

impl From<ImportedResource> for protocol::ImportedResource {
    fn from(resource: ImportedResource) -> Self {
        Self {
            state: encode(Some(&resource.state)),
            resource_type: resource.resource_type,
        }
    }
}

/// Answer to `GetMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Data source type names.
    pub data_sources: Vec<String>,
    /// Capability flags.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Destroy operations go through `Plan` with a null proposed state.
    pub plan_destroy: bool,
}

/// Protocol version announced in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// First field of the handshake line.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";
