//! Data source API.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use super::{decode, GrafanaClient, GrafanaError};

/// A Grafana data source as exchanged with `/api/datasources`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub org_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub basic_auth: bool,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub json_data: Map<String, Value>,
    /// Write-only; Grafana never returns it.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub secure_json_data: Map<String, Value>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Create and update answer with `{"datasource": {...}, "message": ...}`.
#[derive(Deserialize)]
struct DataSourceEnvelope {
    datasource: DataSource,
}

impl GrafanaClient {
    /// Create a data source.
    #[instrument(skip_all, fields(name = %ds.name))]
    pub async fn new_data_source(&self, ds: &DataSource) -> Result<DataSource, GrafanaError> {
        let value = self
            .send(Method::POST, &["api", "datasources"], ds)
            .await?;
        decode::<DataSourceEnvelope>(value, "data source").map(|e| e.datasource)
    }

    /// Replace a data source, addressed by its current UID.
    #[instrument(skip(self, ds), fields(name = %ds.name))]
    pub async fn update_data_source_by_uid(
        &self,
        uid: &str,
        ds: &DataSource,
    ) -> Result<DataSource, GrafanaError> {
        let value = self
            .send(Method::PUT, &["api", "datasources", "uid", uid], ds)
            .await?;
        decode::<DataSourceEnvelope>(value, "data source").map(|e| e.datasource)
    }

    /// Fetch a data source by UID.
    #[instrument(skip(self))]
    pub async fn data_source_by_uid(&self, uid: &str) -> Result<DataSource, GrafanaError> {
        self.get(&["api", "datasources", "uid", uid], "data source")
            .await
    }

    /// Lookup by the legacy numeric ID.
    #[instrument(skip(self))]
    pub async fn data_source_by_id(&self, id: i64) -> Result<DataSource, GrafanaError> {
        self.get(&["api", "datasources", &id.to_string()], "data source")
            .await
    }

    /// Fetch a data source by name.
    #[instrument(skip(self))]
    pub async fn data_source_by_name(&self, name: &str) -> Result<DataSource, GrafanaError> {
        self.get(&["api", "datasources", "name", name], "data source")
            .await
    }

    /// Delete a data source.
    #[instrument(skip(self))]
    pub async fn delete_data_source_by_uid(&self, uid: &str) -> Result<(), GrafanaError> {
        self.delete(&["api", "datasources", "uid", uid]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_data_source_payload() {
        let ds = DataSource {
            name: "loki".to_string(),
            ds_type: "loki".to_string(),
            access: "proxy".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&ds).unwrap();
        assert_eq!(value["type"], "loki");
        assert!(value.get("id").is_none());
        assert!(value.get("uid").is_none());
        assert!(value.get("secureJsonData").is_none());
    }

    #[test]
    fn test_envelope_decoding() {
        let envelope: DataSourceEnvelope = serde_json::from_value(json!({
            "datasource": {
                "id": 7,
                "uid": "abc",
                "orgId": 1,
                "name": "prom",
                "type": "prometheus",
                "access": "proxy",
                "url": "http://localhost:9090",
                "basicAuth": false,
                "isDefault": true,
                "jsonData": {"httpMethod": "POST"}
            },
            "id": 7,
            "message": "Datasource added",
            "name": "prom"
        }))
        .unwrap();
        assert_eq!(envelope.datasource.uid, "abc");
        assert!(envelope.datasource.is_default);
        assert_eq!(envelope.datasource.json_data["httpMethod"], "POST");
    }
}
