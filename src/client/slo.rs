//! Grafana Cloud SLO plugin API.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{decode, GrafanaClient, GrafanaError};

const SLO_API: [&str; 6] = [
    "api",
    "plugins",
    "grafana-slo-app",
    "resources",
    "v1",
    "slo",
];

/// A service level objective.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: SloQuery,
    /// `None` disables alerting; an empty value asks Grafana to generate the
    /// default fast-burn and slow-burn rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting: Option<SloAlerting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<SloLabel>,
    #[serde(default)]
    pub objectives: Vec<SloObjective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_datasource: Option<SloDestinationDatasource>,
}

/// How the SLI is computed. Exactly one of the typed queries is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SloQuery {
    #[serde(rename = "type")]
    pub query_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform: Option<SloQueryFreeform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<SloQueryRatio>,
}

/// A PromQL ratio expression.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SloQueryFreeform {
    pub query: String,
}

/// Success and total counters, divided by Grafana.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloQueryRatio {
    pub success_metric: SloMetric,
    pub total_metric: SloMetric,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by_labels: Vec<String>,
}

/// A Prometheus metric selector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloMetric {
    pub prometheus_metric: String,
}

/// Target ratio over a rolling window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SloObjective {
    pub value: f64,
    pub window: String,
}

/// A key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SloLabel {
    pub key: String,
    pub value: String,
}

/// Labels and annotations for the generated burn rate alerts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloAlerting {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<SloLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<SloLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_burn: Option<SloAlertingMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_burn: Option<SloAlertingMetadata>,
}

/// Labels and annotations for one burn rate alert.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SloAlertingMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<SloLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<SloLabel>,
}

/// Where recording rule output is written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SloDestinationDatasource {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub ds_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

#[derive(Deserialize)]
struct CreatedSlo {
    uuid: String,
}

fn slo_path(uuid: Option<&str>) -> Vec<&str> {
    let mut path = SLO_API.to_vec();
    if let Some(uuid) = uuid {
        path.push(uuid);
    }
    path
}

impl GrafanaClient {
    /// Create an SLO and return its UUID.
    #[instrument(skip_all, fields(name = %slo.name))]
    pub async fn new_slo(&self, slo: &Slo) -> Result<String, GrafanaError> {
        let value = self.send(Method::POST, &slo_path(None), slo).await?;
        decode::<CreatedSlo>(value, "SLO").map(|c| c.uuid)
    }

    /// Fetch an SLO by UUID.
    #[instrument(skip(self))]
    pub async fn slo(&self, uuid: &str) -> Result<Slo, GrafanaError> {
        self.get(&slo_path(Some(uuid)), "SLO").await
    }

    /// Replace an SLO.
    #[instrument(skip(self, slo), fields(name = %slo.name))]
    pub async fn update_slo(&self, uuid: &str, slo: &Slo) -> Result<(), GrafanaError> {
        self.send(Method::PUT, &slo_path(Some(uuid)), slo)
            .await
            .map(|_| ())
    }

    /// Delete an SLO and its generated rules.
    #[instrument(skip(self))]
    pub async fn delete_slo(&self, uuid: &str) -> Result<(), GrafanaError> {
        self.delete(&slo_path(Some(uuid))).await
    }
}
