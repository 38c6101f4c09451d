//! `grafana_data_source`.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use super::{found, org_id_value, read_back, state_id, GrafanaContext, Resource};
use crate::client::DataSource;
use crate::error::ProviderError;
use crate::ids::org_resource_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::{bool_attr, opt_str, str_attr, string_map};

/// Resource type name.
pub const DATA_SOURCE: &str = "grafana_data_source";

const HEADER_NAME_PREFIX: &str = "httpHeaderName";
const HEADER_VALUE_PREFIX: &str = "httpHeaderValue";

/// A Grafana data source.
#[derive(Debug, Default)]
pub struct DataSourceResource;

impl DataSourceResource {
    async fn read_by_key(
        &self,
        ctx: &GrafanaContext,
        id: &str,
        prior: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        let (client, org_id, key) = ctx.client_for_id(id);
        // Numeric keys are legacy IDs from before data sources had UIDs.
        let result = match key.parse::<i64>() {
            Ok(legacy_id) => client.data_source_by_id(legacy_id).await,
            Err(_) => client.data_source_by_uid(key).await,
        };
        let Some(ds) = found(result, DATA_SOURCE, id)? else {
            return Ok(None);
        };
        let org_id = if ds.org_id > 0 { ds.org_id } else { org_id };
        Ok(Some(data_source_to_state(&ds, org_id, prior)))
    }
}

#[async_trait::async_trait]
impl Resource for DataSourceResource {
    fn type_name(&self) -> &'static str {
        DATA_SOURCE
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Manages a data source")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "org_id",
                Attribute::optional_computed_string()
                    .with_force_new()
                    .with_description("The organization ID. Defaults to the provider's org_id."),
            )
            .with_attribute(
                "uid",
                Attribute::optional_computed_string()
                    .with_description("Unique identifier. Generated by Grafana when unset."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "type",
                Attribute::required_string().with_description("The data source plugin, e.g. `prometheus`."),
            )
            .with_attribute(
                "access_mode",
                Attribute::optional_string()
                    .with_default(json!("proxy"))
                    .with_description("`proxy` or `direct`."),
            )
            .with_attribute("basic_auth_enabled", Attribute::optional_bool())
            .with_attribute("basic_auth_username", Attribute::optional_string())
            .with_attribute("database_name", Attribute::optional_string())
            .with_attribute("is_default", Attribute::optional_bool())
            .with_attribute("url", Attribute::optional_string())
            .with_attribute("username", Attribute::optional_string())
            .with_attribute(
                "json_data_encoded",
                Attribute::optional_string()
                    .with_description("Serialized JSON object with the plugin settings."),
            )
            .with_attribute(
                "secure_json_data_encoded",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Serialized JSON object with secret settings. Never read back."),
            )
            .with_attribute(
                "http_headers",
                Attribute::string_map()
                    .sensitive()
                    .with_description("Custom HTTP headers sent to the data source."),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for key in ["json_data_encoded", "secure_json_data_encoded"] {
            if let Err(e) = parse_json_object(opt_str(config, key)) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid {}", key))
                        .with_detail(e.to_string())
                        .with_attribute(key),
                );
            }
        }
        if let Ok(json_data) = parse_json_object(opt_str(config, "json_data_encoded")) {
            if !string_map(config, "http_headers").is_empty()
                && json_data.keys().any(|k| k.starts_with(HEADER_NAME_PREFIX))
            {
                diagnostics.push(
                    Diagnostic::error("Conflicting HTTP headers")
                        .with_detail("Set headers with http_headers, not httpHeaderName keys in json_data_encoded")
                        .with_attribute("json_data_encoded"),
                );
            }
        }
        diagnostics
    }

    fn normalize(&self, planned: &mut Value) {
        let normalized = match opt_str(planned, "json_data_encoded").map(normalize_json_object) {
            Some(Ok(text)) => text,
            // Leave invalid text alone; validation reports it.
            Some(Err(_)) => return,
            None => Value::Null,
        };
        if let Some(obj) = planned.as_object_mut() {
            obj.insert("json_data_encoded".to_string(), normalized);
        }
    }

    #[instrument(skip_all, fields(name = str_attr(planned, "name")))]
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError> {
        let (client, org_id) = ctx.client_for_new(planned);
        let created = client.new_data_source(&data_source_from_state(planned)?).await?;
        info!(org_id, uid = %created.uid, "created data source");

        let mut state = planned.clone();
        state["id"] = json!(org_resource_id(org_id, &created.uid));
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn read(&self, ctx: &GrafanaContext, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(state)?;
        self.read_by_key(ctx, id, state).await
    }

    #[instrument(skip_all, fields(id = str_attr(prior, "id")))]
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let (client, org_id, key) = ctx.client_for_id(state_id(prior)?);
        // Addressed by the current UID so that a new `uid` renames in place.
        let current_uid = opt_str(prior, "uid").unwrap_or(key);
        let mut payload = data_source_from_state(planned)?;
        if payload.uid.is_empty() {
            payload.uid = current_uid.to_string();
        }
        let updated = client.update_data_source_by_uid(current_uid, &payload).await?;
        debug!(from = current_uid, to = %updated.uid, "updated data source");

        let mut state = planned.clone();
        state["id"] = json!(org_resource_id(org_id, &updated.uid));
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError> {
        let id = state_id(state)?;
        let (client, _, key) = ctx.client_for_id(id);
        let uid = opt_str(state, "uid").unwrap_or(key);
        found(client.delete_data_source_by_uid(uid).await, DATA_SOURCE, id)?;
        Ok(())
    }

    async fn import(&self, ctx: &GrafanaContext, id: &str) -> Result<Value, ProviderError> {
        self.read_by_key(ctx, id, &Value::Null)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("data source '{}' not found", id)))
    }
}

/// The API payload for a planned state. Custom headers become numbered
/// `httpHeaderName{N}` / `httpHeaderValue{N}` pairs, in header name order.
pub(crate) fn data_source_from_state(state: &Value) -> Result<DataSource, ProviderError> {
    let mut json_data = parse_json_object(opt_str(state, "json_data_encoded"))?;
    let mut secure_json_data = parse_json_object(opt_str(state, "secure_json_data_encoded"))?;
    for (i, (name, value)) in string_map(state, "http_headers").into_iter().enumerate() {
        json_data.insert(format!("{}{}", HEADER_NAME_PREFIX, i + 1), Value::String(name));
        secure_json_data.insert(format!("{}{}", HEADER_VALUE_PREFIX, i + 1), Value::String(value));
    }

    Ok(DataSource {
        uid: str_attr(state, "uid").to_string(),
        name: str_attr(state, "name").to_string(),
        ds_type: str_attr(state, "type").to_string(),
        access: opt_str(state, "access_mode").unwrap_or("proxy").to_string(),
        url: str_attr(state, "url").to_string(),
        user: str_attr(state, "username").to_string(),
        database: str_attr(state, "database_name").to_string(),
        basic_auth: bool_attr(state, "basic_auth_enabled"),
        basic_auth_user: str_attr(state, "basic_auth_username").to_string(),
        is_default: bool_attr(state, "is_default"),
        json_data,
        secure_json_data,
        ..Default::default()
    })
}

/// State for a data source read from Grafana. Secrets are never returned by
/// the API, so they are taken from `prior`.
pub(crate) fn data_source_to_state(ds: &DataSource, org_id: i64, prior: &Value) -> Value {
    let prior_headers = string_map(prior, "http_headers");
    let mut headers = BTreeMap::new();
    let mut json_data = Map::new();
    for (key, value) in &ds.json_data {
        match (key.strip_prefix(HEADER_NAME_PREFIX), value.as_str()) {
            (Some(_), Some(name)) => {
                let value = prior_headers.get(name).cloned().unwrap_or_default();
                headers.insert(name.to_string(), Value::String(value));
            },
            _ => {
                json_data.insert(key.clone(), value.clone());
            },
        }
    }

    let json_data_encoded = if json_data.is_empty() {
        Value::Null
    } else {
        Value::String(Value::Object(json_data).to_string())
    };
    let http_headers = if headers.is_empty() {
        Value::Null
    } else {
        Value::Object(headers.into_iter().collect())
    };

    json!({
        "id": org_resource_id(org_id, &ds.uid),
        "org_id": org_id_value(org_id),
        "uid": ds.uid,
        "name": ds.name,
        "type": ds.ds_type,
        "access_mode": ds.access,
        "basic_auth_enabled": ds.basic_auth,
        "basic_auth_username": ds.basic_auth_user,
        "database_name": ds.database,
        "is_default": ds.is_default,
        "url": ds.url,
        "username": ds.user,
        "json_data_encoded": json_data_encoded,
        "secure_json_data_encoded": prior.get("secure_json_data_encoded").cloned().unwrap_or(Value::Null),
        "http_headers": http_headers,
    })
}

fn parse_json_object(text: Option<&str>) -> Result<Map<String, Value>, ProviderError> {
    let Some(text) = text else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ProviderError::Validation(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Compact JSON with sorted keys; empty objects normalize to `null`.
fn normalize_json_object(text: &str) -> Result<Value, ProviderError> {
    let map = parse_json_object(Some(text))?;
    if map.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(Value::Object(map).to_string()))
}
