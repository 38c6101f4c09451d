//! `grafana_data_source` lookup.

use serde_json::Value;
use tracing::instrument;

use super::Lookup;
use crate::error::ProviderError;
use crate::resources::{data_source_to_state, GrafanaContext};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::opt_str;

/// Data source type name.
pub const DATA_SOURCE_LOOKUP: &str = "grafana_data_source";

/// Attributes only the managing configuration knows.
const SECRET_ATTRIBUTES: [&str; 2] = ["secure_json_data_encoded", "http_headers"];

/// Finds a data source by UID or name.
#[derive(Debug, Default)]
pub struct DataSourceLookup;

#[async_trait::async_trait]
impl Lookup for DataSourceLookup {
    fn type_name(&self) -> &'static str {
        DATA_SOURCE_LOOKUP
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::v0()
            .with_description("Reads a data source by UID or name")
            .with_attribute("uid", Attribute::optional_computed_string())
            .with_attribute("name", Attribute::optional_computed_string())
            .with_attribute("org_id", Attribute::optional_computed_string());
        for computed in [
            "id",
            "type",
            "access_mode",
            "basic_auth_username",
            "database_name",
            "url",
            "username",
            "json_data_encoded",
        ] {
            schema = schema.with_attribute(computed, Attribute::computed_string());
        }
        schema
            .with_attribute("basic_auth_enabled", Attribute::computed_bool())
            .with_attribute("is_default", Attribute::computed_bool())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        match (opt_str(config, "uid"), opt_str(config, "name")) {
            (None, None) => vec![Diagnostic::error("Set uid or name")
                .with_detail("A data source is found by its UID or by its name")],
            (Some(_), Some(_)) => vec![Diagnostic::error("Set only one of uid and name")
                .with_attribute("name")],
            _ => vec![],
        }
    }

    #[instrument(skip_all)]
    async fn read(&self, ctx: &GrafanaContext, config: &Value) -> Result<Value, ProviderError> {
        let (client, org_id) = ctx.client_for_new(config);
        let ds = match (opt_str(config, "uid"), opt_str(config, "name")) {
            (Some(uid), _) => client.data_source_by_uid(uid).await?,
            (None, Some(name)) => client.data_source_by_name(name).await?,
            (None, None) => {
                return Err(ProviderError::Validation(
                    "either uid or name is required".to_string(),
                ))
            },
        };
        let org_id = if ds.org_id > 0 { ds.org_id } else { org_id };

        let mut state = data_source_to_state(&ds, org_id, &Value::Null);
        if let Value::Object(map) = &mut state {
            for key in SECRET_ATTRIBUTES {
                map.remove(key);
            }
        }
        Ok(state)
    }
}
