//! Alert rule provisioning API (`/api/v1/provisioning`).

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::{decode, GrafanaClient, GrafanaError};

const DISABLE_PROVENANCE_HEADER: &str = "X-Disable-Provenance";

/// A group of alert rules evaluated together inside a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    pub title: String,
    pub folder_uid: String,
    /// Evaluation interval in seconds.
    pub interval: i64,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

/// An alert rule inside a rule group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(rename = "orgID", default)]
    pub org_id: i64,
    #[serde(rename = "folderUID", default)]
    pub folder_uid: String,
    #[serde(rename = "ruleGroup", default)]
    pub rule_group: String,
    pub title: String,
    pub condition: String,
    #[serde(default)]
    pub data: Vec<AlertQuery>,
    #[serde(rename = "noDataState", default)]
    pub no_data_state: String,
    #[serde(rename = "execErrState", default)]
    pub exec_err_state: String,
    /// Pending period, as a duration string (`2m`).
    #[serde(rename = "for", default, deserialize_with = "duration_from_string_or_nanos")]
    pub for_duration: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "isPaused", default)]
    pub is_paused: bool,
}

/// One query or expression a rule evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub ref_id: String,
    #[serde(default)]
    pub query_type: String,
    pub relative_time_range: RelativeTimeRange,
    pub datasource_uid: String,
    /// The query model; its shape depends on the data source.
    pub model: Value,
}

/// Query window, in seconds before evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelativeTimeRange {
    pub from: i64,
    pub to: i64,
}

/// Older Grafana versions serialize `for` as nanoseconds.
fn duration_from_string_or_nanos<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(format!("{}s", n.as_i64().unwrap_or(0) / 1_000_000_000)),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "invalid duration: {}",
            other
        ))),
    }
}

impl GrafanaClient {
    /// Fetch a rule group by folder and name.
    #[instrument(skip(self))]
    pub async fn alert_rule_group(
        &self,
        folder_uid: &str,
        group: &str,
    ) -> Result<RuleGroup, GrafanaError> {
        self.get(
            &[
                "api",
                "v1",
                "provisioning",
                "folder",
                folder_uid,
                "rule-groups",
                group,
            ],
            "rule group",
        )
        .await
    }

    /// Create or replace a rule group. Rules missing from `group` are removed
    /// by Grafana; rules with a UID are updated in place.
    #[instrument(skip(self, group), fields(folder_uid = %group.folder_uid, group = %group.title))]
    pub async fn set_alert_rule_group(
        &self,
        group: &RuleGroup,
        disable_provenance: bool,
    ) -> Result<RuleGroup, GrafanaError> {
        let url = self.url(&[
            "api",
            "v1",
            "provisioning",
            "folder",
            &group.folder_uid,
            "rule-groups",
            &group.title,
        ]);
        let mut request = self.request(Method::PUT, url).json(group);
        if disable_provenance {
            request = request.header(DISABLE_PROVENANCE_HEADER, "true");
        }
        let value = self.execute(request).await?;
        decode(value, "rule group")
    }

    /// Delete one alert rule.
    #[instrument(skip(self))]
    pub async fn delete_alert_rule(&self, uid: &str) -> Result<(), GrafanaError> {
        self.delete(&["api", "v1", "provisioning", "alert-rules", uid])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_group_from_api() {
        let group: RuleGroup = serde_json::from_value(json!({
            "title": "My Rule Group",
            "folderUid": "f1",
            "interval": 240,
            "rules": [{
                "uid": "r1",
                "orgID": 1,
                "folderUID": "f1",
                "ruleGroup": "My Rule Group",
                "title": "My Alert Rule 1",
                "condition": "B",
                "data": [{
                    "refId": "A",
                    "queryType": "",
                    "relativeTimeRange": {"from": 600, "to": 0},
                    "datasourceUid": "PD8C576611E62080A",
                    "model": {"hide": false, "refId": "A"}
                }],
                "noDataState": "NoData",
                "execErrState": "Alerting",
                "for": "2m",
                "isPaused": false
            }]
        }))
        .unwrap();

        assert_eq!(group.interval, 240);
        assert_eq!(group.rules.len(), 1);
        let rule = &group.rules[0];
        assert_eq!(rule.for_duration, "2m");
        assert_eq!(rule.data[0].relative_time_range.from, 600);
        assert!(rule.labels.is_empty());
    }

    #[test]
    fn test_for_as_nanoseconds() {
        let rule: AlertRule = serde_json::from_value(json!({
            "title": "t",
            "condition": "A",
            "for": 120_000_000_000i64
        }))
        .unwrap();
        assert_eq!(rule.for_duration, "120s");
    }

    #[test]
    fn test_new_rule_omits_empty_uid() {
        let rule = AlertRule {
            uid: String::new(),
            org_id: 1,
            folder_uid: "f1".to_string(),
            rule_group: "g".to_string(),
            title: "t".to_string(),
            condition: "A".to_string(),
            data: vec![],
            no_data_state: "NoData".to_string(),
            exec_err_state: "Alerting".to_string(),
            for_duration: "0s".to_string(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            is_paused: false,
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert!(value.get("uid").is_none());
        assert_eq!(value["for"], "0s");
        assert_eq!(value["orgID"], 1);
    }
}
