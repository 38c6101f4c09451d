//! `grafana_slo`: service level objectives in Grafana Cloud.
//!
//! The `alerting` block is presence-sensitive. Leaving it out sends no
//! alerting object and Grafana creates no alert rules; an empty
//! `alerting {}` sends an empty object and Grafana generates the default
//! fast-burn and slow-burn rules.

use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{found, read_back, state_id, GrafanaContext, Resource};
use crate::client::{
    Slo, SloAlerting, SloAlertingMetadata, SloDestinationDatasource, SloLabel, SloMetric,
    SloObjective, SloQuery, SloQueryFreeform, SloQueryRatio,
};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::state::{f64_attr, list_attr, opt_str, single_block, str_attr, string_list};

/// Resource type name.
pub const SLO: &str = "grafana_slo";

const QUERY_TYPES: [&str; 2] = ["freeform", "ratio"];

/// An SLO managed by the Grafana Cloud SLO plugin.
#[derive(Debug, Default)]
pub struct SloResource;

fn label_block() -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_attribute("key", Attribute::required_string())
            .with_attribute("value", Attribute::required_string()),
    )
}

fn alerting_metadata_block() -> NestedBlock {
    NestedBlock::single(
        Block::new()
            .with_block("label", label_block())
            .with_block("annotation", label_block()),
    )
}

#[async_trait::async_trait]
impl Resource for SloResource {
    fn type_name(&self) -> &'static str {
        SLO
    }

    fn schema(&self) -> Schema {
        let query = Block::new()
            .with_attribute(
                "type",
                Attribute::required_string().with_description("`freeform` or `ratio`."),
            )
            .with_block(
                "freeform",
                NestedBlock::single(Block::new().with_attribute("query", Attribute::required_string())),
            )
            .with_block(
                "ratio",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("success_metric", Attribute::required_string())
                        .with_attribute("total_metric", Attribute::required_string())
                        .with_attribute("group_by_labels", Attribute::string_list()),
                ),
            );

        let objectives = Block::new()
            .with_attribute(
                "value",
                Attribute::required_float64().with_description("Target, strictly between 0 and 1."),
            )
            .with_attribute(
                "window",
                Attribute::required_string().with_description("Evaluation window, e.g. `28d`."),
            );

        let destination = Block::new()
            .with_attribute("type", Attribute::optional_string())
            .with_attribute("uid", Attribute::optional_string());

        let alerting = Block::new()
            .with_description("Omit to disable alerting; an empty block uses the defaults.")
            .with_block("label", label_block())
            .with_block("annotation", label_block())
            .with_block("fastburn", alerting_metadata_block())
            .with_block("slowburn", alerting_metadata_block());

        Schema::v0()
            .with_description("Manages a Grafana Cloud SLO")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::required_string())
            .with_block("query", NestedBlock::single(query).with_min_items(1))
            .with_block("objectives", NestedBlock::list(objectives).with_min_items(1))
            .with_block("destination_datasource", NestedBlock::single(destination))
            .with_block("label", label_block())
            .with_block("alerting", NestedBlock::single(alerting))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (i, objective) in list_attr(config, "objectives").iter().enumerate() {
            if objective.get("value").is_some_and(Value::is_number) {
                let value = f64_attr(objective, "value");
                if value <= 0.0 || value >= 1.0 {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid objective value {}", value))
                            .with_detail("Objective values must be strictly between 0 and 1")
                            .with_attribute(format!("objectives.{}.value", i)),
                    );
                }
            }
            if let Some(window) = opt_str(objective, "window") {
                if !is_window(window) {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid objective window '{}'", window))
                            .with_detail("Use a duration such as 7d, 28d or 4w")
                            .with_attribute(format!("objectives.{}.window", i)),
                    );
                }
            }
        }

        if let Some(query) = single_block(config, "query") {
            let query_type = str_attr(query, "type");
            if !QUERY_TYPES.contains(&query_type) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid query type '{}'", query_type))
                        .with_detail("Expected freeform or ratio")
                        .with_attribute("query.0.type"),
                );
            } else if single_block(query, query_type).is_none() {
                diagnostics.push(
                    Diagnostic::error(format!("Missing {} query", query_type))
                        .with_detail(format!("A {} query needs a {} block", query_type, query_type))
                        .with_attribute(format!("query.0.{}", query_type)),
                );
            }
        }

        diagnostics
    }

    #[instrument(skip_all, fields(name = str_attr(planned, "name")))]
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError> {
        let uuid = ctx.client().new_slo(&slo_from_state(planned)).await?;
        info!(uuid = %uuid, "created SLO");
        read_back(self, ctx, &json!({ "id": uuid })).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn read(&self, ctx: &GrafanaContext, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(state)?;
        Ok(found(ctx.client().slo(id).await, SLO, id)?.map(|slo| slo_to_state(&slo)))
    }

    #[instrument(skip_all, fields(id = str_attr(prior, "id")))]
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let id = state_id(prior)?;
        let mut slo = slo_from_state(planned);
        slo.uuid = id.to_string();
        ctx.client().update_slo(id, &slo).await?;
        read_back(self, ctx, &json!({ "id": id })).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError> {
        let id = state_id(state)?;
        found(ctx.client().delete_slo(id).await, SLO, id)?;
        Ok(())
    }
}

fn is_window(window: &str) -> bool {
    let Some(unit_at) = window.find(|c: char| !c.is_ascii_digit()) else {
        return false;
    };
    unit_at > 0
        && window[..unit_at].parse::<u64>().is_ok_and(|n| n > 0)
        && matches!(&window[unit_at..], "m" | "h" | "d" | "w" | "y")
}

fn labels_from_state(value: &Value, key: &str) -> Vec<SloLabel> {
    list_attr(value, key)
        .iter()
        .map(|label| SloLabel {
            key: str_attr(label, "key").to_string(),
            value: str_attr(label, "value").to_string(),
        })
        .collect()
}

fn labels_to_state(labels: &[SloLabel]) -> Value {
    if labels.is_empty() {
        return Value::Null;
    }
    labels
        .iter()
        .map(|l| json!({ "key": l.key, "value": l.value }))
        .collect()
}

fn alerting_metadata_from_state(value: &Value, key: &str) -> Option<SloAlertingMetadata> {
    single_block(value, key).map(|block| SloAlertingMetadata {
        labels: labels_from_state(block, "label"),
        annotations: labels_from_state(block, "annotation"),
    })
}

fn alerting_metadata_to_state(metadata: &Option<SloAlertingMetadata>) -> Value {
    match metadata {
        Some(m) => json!([{
            "label": labels_to_state(&m.labels),
            "annotation": labels_to_state(&m.annotations),
        }]),
        None => Value::Null,
    }
}

fn slo_from_state(state: &Value) -> Slo {
    let query = single_block(state, "query");
    let query_type = query.map(|q| str_attr(q, "type")).unwrap_or_default();
    let freeform = query
        .and_then(|q| single_block(q, "freeform"))
        .map(|f| SloQueryFreeform {
            query: str_attr(f, "query").to_string(),
        });
    let ratio = query.and_then(|q| single_block(q, "ratio")).map(|r| SloQueryRatio {
        success_metric: SloMetric {
            prometheus_metric: str_attr(r, "success_metric").to_string(),
        },
        total_metric: SloMetric {
            prometheus_metric: str_attr(r, "total_metric").to_string(),
        },
        group_by_labels: string_list(r, "group_by_labels"),
    });

    let alerting = single_block(state, "alerting").map(|a| SloAlerting {
        labels: labels_from_state(a, "label"),
        annotations: labels_from_state(a, "annotation"),
        fast_burn: alerting_metadata_from_state(a, "fastburn"),
        slow_burn: alerting_metadata_from_state(a, "slowburn"),
    });

    Slo {
        uuid: String::new(),
        name: str_attr(state, "name").to_string(),
        description: str_attr(state, "description").to_string(),
        query: SloQuery {
            query_type: query_type.to_string(),
            freeform,
            ratio,
        },
        alerting,
        labels: labels_from_state(state, "label"),
        objectives: list_attr(state, "objectives")
            .iter()
            .map(|o| SloObjective {
                value: f64_attr(o, "value"),
                window: str_attr(o, "window").to_string(),
            })
            .collect(),
        destination_datasource: single_block(state, "destination_datasource").map(|d| {
            SloDestinationDatasource {
                ds_type: str_attr(d, "type").to_string(),
                uid: str_attr(d, "uid").to_string(),
            }
        }),
    }
}

fn slo_to_state(slo: &Slo) -> Value {
    let mut query = json!({ "type": slo.query.query_type });
    if let Some(freeform) = &slo.query.freeform {
        query["freeform"] = json!([{ "query": freeform.query }]);
    }
    if let Some(ratio) = &slo.query.ratio {
        query["ratio"] = json!([{
            "success_metric": ratio.success_metric.prometheus_metric,
            "total_metric": ratio.total_metric.prometheus_metric,
            "group_by_labels": ratio.group_by_labels,
        }]);
    }

    let alerting = match &slo.alerting {
        Some(a) => json!([{
            "label": labels_to_state(&a.labels),
            "annotation": labels_to_state(&a.annotations),
            "fastburn": alerting_metadata_to_state(&a.fast_burn),
            "slowburn": alerting_metadata_to_state(&a.slow_burn),
        }]),
        None => Value::Null,
    };

    let destination = match &slo.destination_datasource {
        Some(d) => json!([{ "type": d.ds_type, "uid": d.uid }]),
        None => Value::Null,
    };

    json!({
        "id": slo.uuid,
        "name": slo.name,
        "description": slo.description,
        "query": [query],
        "objectives": slo
            .objectives
            .iter()
            .map(|o| json!({ "value": o.value, "window": o.window }))
            .collect::<Vec<_>>(),
        "destination_datasource": destination,
        "label": labels_to_state(&slo.labels),
        "alerting": alerting,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::values_equal;

    const QUERY: &str = r#"sum(rate(apiserver_request_total{code!="500"}[$__rate_interval])) / sum(rate(apiserver_request_total[$__rate_interval]))"#;

    fn config() -> Value {
        json!({
            "name": "Terraform Testing",
            "description": "Terraform Description",
            "query": [{"type": "freeform", "freeform": [{"query": QUERY}]}],
            "objectives": [{"value": 0.995, "window": "30d"}],
            "destination_datasource": [{"type": "mimir", "uid": "grafanacloud-prom"}],
            "label": [{"key": "slo", "value": "terraform"}]
        })
    }

    #[test]
    fn test_absent_alerting_sends_nothing() {
        let slo = slo_from_state(&config());
        assert!(slo.alerting.is_none());
        let body = serde_json::to_value(&slo).unwrap();
        assert!(body.get("alerting").is_none());
        assert_eq!(body["query"]["freeform"]["query"], QUERY);
    }

    #[test]
    fn test_empty_alerting_sends_empty_object() {
        let mut state = config();
        state["alerting"] = json!([{}]);
        let slo = slo_from_state(&state);
        assert_eq!(slo.alerting, Some(SloAlerting::default()));
        let body = serde_json::to_value(&slo).unwrap();
        assert_eq!(body["alerting"], json!({}));
    }

    #[test]
    fn test_alerting_metadata() {
        let mut state = config();
        state["alerting"] = json!([{
            "fastburn": [{"annotation": [{"key": "name", "value": "fast"}]}]
        }]);
        let slo = slo_from_state(&state);
        let alerting = slo.alerting.unwrap();
        assert_eq!(alerting.fast_burn.unwrap().annotations[0].value, "fast");
        assert!(alerting.slow_burn.is_none());
    }

    #[test]
    fn test_state_matches_config() {
        let mut slo = slo_from_state(&config());
        slo.uuid = "abc-123".to_string();
        let state = slo_to_state(&slo);
        assert_eq!(state["id"], "abc-123");
        assert_eq!(state["query"][0]["type"], "freeform");
        assert_eq!(state["query"][0]["freeform"][0]["query"], QUERY);
        assert_eq!(state["objectives"][0]["value"], 0.995);
        assert!(state["alerting"].is_null());
        for key in ["query", "objectives", "destination_datasource", "label"] {
            assert!(values_equal(&state[key], &config()[key]), "{}", key);
        }
    }

    #[test]
    fn test_ratio_query() {
        let state = json!({
            "name": "ratio",
            "description": "d",
            "query": [{"type": "ratio", "ratio": [{
                "success_metric": "kubelet_http_requests_total{status!~\"5..\"}",
                "total_metric": "kubelet_http_requests_total",
                "group_by_labels": ["job", "instance"]
            }]}],
            "objectives": [{"value": 0.995, "window": "30d"}]
        });
        let slo = slo_from_state(&state);
        let ratio = slo.query.ratio.as_ref().unwrap();
        assert_eq!(ratio.total_metric.prometheus_metric, "kubelet_http_requests_total");
        let back = slo_to_state(&slo);
        assert_eq!(back["query"][0]["ratio"][0]["group_by_labels"], json!(["job", "instance"]));
    }

    #[test]
    fn test_validate_objectives() {
        assert!(SloResource.validate(&config()).is_empty());

        let mut invalid = config();
        invalid["objectives"] = json!([{"value": 1.5, "window": "1m"}, {"value": 0.9, "window": "month"}]);
        let diagnostics = SloResource.validate(&invalid);
        let paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.as_deref()).collect();
        assert_eq!(paths, vec!["objectives.0.value", "objectives.1.window"]);

        invalid["objectives"] = json!([{"value": 1.0, "window": "28d"}, {"value": 0.0, "window": "28d"}]);
        assert_eq!(SloResource.validate(&invalid).len(), 2);
    }

    #[test]
    fn test_validate_query() {
        let mut config = config();
        config["query"] = json!([{"type": "ratio", "freeform": [{"query": "up"}]}]);
        let diagnostics = SloResource.validate(&config);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("query.0.ratio"));

        config["query"] = json!([{"type": "latency"}]);
        let diagnostics = SloResource.validate(&config);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("query.0.type"));
    }
}
