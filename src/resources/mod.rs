//! Managed resources.
//!
//! Each resource maps one Grafana object to one schema and implements
//! [`Resource`]. The provider dispatches to them by type name; planning is
//! shared (see [`crate::plan`]).

mod data_source;
mod folder;
mod organization;
mod public_dashboard;
mod rule_group;
mod slo;

use serde_json::{json, Value};
use tracing::warn;

use crate::client::{GrafanaClient, GrafanaError};
use crate::error::ProviderError;
use crate::ids::split_org_resource_id;
use crate::schema::{Diagnostic, Schema};
use crate::state;

pub use data_source::{DataSourceResource, DATA_SOURCE};
pub use folder::{FolderResource, FOLDER};
pub use organization::{OrganizationResource, ORGANIZATION};
pub use public_dashboard::{PublicDashboardResource, PUBLIC_DASHBOARD};
pub use rule_group::{normalize_model, RuleGroupResource, RULE_GROUP};
pub use slo::{SloResource, SLO};

pub(crate) use data_source::data_source_to_state;

/// The configured client plus the org used when a resource names none.
#[derive(Debug, Clone)]
pub struct GrafanaContext {
    client: GrafanaClient,
    default_org_id: i64,
}

impl GrafanaContext {
    /// A context around `client`; `default_org_id` applies to IDs and
    /// configurations without an org.
    pub fn new(client: GrafanaClient, default_org_id: i64) -> Self {
        Self {
            client,
            default_org_id,
        }
    }

    /// The client without org scoping.
    pub fn client(&self) -> &GrafanaClient {
        &self.client
    }

    /// The org of objects that do not name one.
    pub fn default_org_id(&self) -> i64 {
        self.default_org_id
    }

    /// Client and org for an object about to be created, from its `org_id`
    /// attribute.
    pub fn client_for_new(&self, planned: &Value) -> (GrafanaClient, i64) {
        let org_id = match state::i64_attr(planned, "org_id") {
            org_id if org_id > 0 => org_id,
            _ => self.default_org_id,
        };
        (self.client.with_org_id(org_id), org_id)
    }

    /// Client, org and resource part for an existing `org:id` ID.
    pub fn client_for_id<'a>(&self, id: &'a str) -> (GrafanaClient, i64, &'a str) {
        let (org_id, rest) = split_org_resource_id(id);
        let org_id = org_id.unwrap_or(self.default_org_id);
        (self.client.with_org_id(org_id), org_id, rest)
    }
}

/// A Grafana object managed through create, read, update and delete.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Type name, e.g. `grafana_folder`.
    fn type_name(&self) -> &'static str;

    /// Attributes and blocks.
    fn schema(&self) -> Schema;

    /// Checks beyond what the schema expresses.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// Rewrite a planned state into the form reads produce, so that the two
    /// compare equal.
    fn normalize(&self, planned: &mut Value) {
        let _ = planned;
    }

    /// Create the object and return its state.
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError>;

    /// Read the object back. `None` means it no longer exists.
    async fn read(&self, ctx: &GrafanaContext, state: &Value)
        -> Result<Option<Value>, ProviderError>;

    /// Update the object and return its new state.
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the object.
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError>;

    /// Read an existing object by ID.
    async fn import(&self, ctx: &GrafanaContext, id: &str) -> Result<Value, ProviderError> {
        self.read(ctx, &json!({ "id": id }))
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} '{}' not found", self.type_name(), id)))
    }
}

/// Turn a 404 into `None` so reads can drop vanished objects from state.
pub(crate) fn found<T>(
    result: Result<T, GrafanaError>,
    type_name: &str,
    id: &str,
) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            warn!(resource_type = type_name, id, "remote object not found");
            Ok(None)
        },
        Err(e) => Err(e.into()),
    }
}

/// Read the state of an object that was just written.
pub(crate) async fn read_back<R: Resource + ?Sized>(
    resource: &R,
    ctx: &GrafanaContext,
    state: &Value,
) -> Result<Value, ProviderError> {
    resource.read(ctx, state).await?.ok_or_else(|| {
        ProviderError::NotFound(format!(
            "{} '{}' disappeared right after it was written",
            resource.type_name(),
            state::str_attr(state, "id")
        ))
    })
}

/// The `id` attribute, which every managed state carries.
pub(crate) fn state_id(state: &Value) -> Result<&str, ProviderError> {
    state::opt_str(state, "id")
        .ok_or_else(|| ProviderError::Validation("state has no 'id'".to_string()))
}

/// Org IDs are strings in state, matching what other resources export.
pub(crate) fn org_id_value(org_id: i64) -> Value {
    Value::String(org_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Auth, ClientSettings};

    fn context() -> GrafanaContext {
        let client = GrafanaClient::new(ClientSettings::new("http://localhost:3000", Auth::None))
            .unwrap();
        GrafanaContext::new(client, 1)
    }

    #[test]
    fn test_client_for_new_uses_org_attribute() {
        let ctx = context();
        let (client, org_id) = ctx.client_for_new(&json!({"org_id": "4"}));
        assert_eq!(org_id, 4);
        assert_eq!(client.org_id(), Some(4));

        let (_, org_id) = ctx.client_for_new(&json!({"org_id": ""}));
        assert_eq!(org_id, 1);
    }

    #[test]
    fn test_client_for_id() {
        let ctx = context();
        let (client, org_id, uid) = ctx.client_for_id("3:abc");
        assert_eq!((org_id, uid), (3, "abc"));
        assert_eq!(client.org_id(), Some(3));

        let (_, org_id, uid) = ctx.client_for_id("abc");
        assert_eq!((org_id, uid), (1, "abc"));
    }

    #[test]
    fn test_found_maps_not_found_to_none() {
        let gone: Result<(), GrafanaError> = Err(GrafanaError::Api {
            status: 404,
            message: "not found".to_string(),
        });
        assert_eq!(found(gone, "grafana_folder", "1:abc").unwrap(), None);

        let denied: Result<(), GrafanaError> = Err(GrafanaError::Api {
            status: 403,
            message: "denied".to_string(),
        });
        assert!(matches!(
            found(denied, "grafana_folder", "1:abc"),
            Err(ProviderError::PermissionDenied(_))
        ));
    }
}
