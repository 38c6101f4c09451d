//! `grafana_rule_group`: a folder's group of alert rules, managed as a unit
//! through the alerting provisioning API.
//!
//! The query model of each rule is free-form JSON owned by the data source
//! plugin. Grafana fills in `intervalMs` and `maxDataPoints` when they are
//! missing, and always returns `hide`, so both the configuration and what
//! Grafana returns are normalized with [`normalize_model`] before comparing.

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use super::{found, org_id_value, read_back, state_id, GrafanaContext, Resource};
use crate::client::{AlertQuery, AlertRule, GrafanaClient, RelativeTimeRange, RuleGroup};
use crate::error::ProviderError;
use crate::ids::{org_resource_id, rule_group_key, split_rule_group_key};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::state::{bool_attr, i64_attr, list_attr, map_value, opt_str, single_block, str_attr, string_map};

/// Resource type name.
pub const RULE_GROUP: &str = "grafana_rule_group";

const DEFAULT_INTERVAL_MS: i64 = 1000;
const DEFAULT_MAX_DATA_POINTS: i64 = 43200;

const NO_DATA_STATES: [&str; 3] = ["NoData", "Alerting", "OK"];
const EXEC_ERR_STATES: [&str; 3] = ["OK", "Alerting", "Error"];

/// An alert rule group.
#[derive(Debug, Default)]
pub struct RuleGroupResource;

#[async_trait::async_trait]
impl Resource for RuleGroupResource {
    fn type_name(&self) -> &'static str {
        RULE_GROUP
    }

    fn schema(&self) -> Schema {
        let relative_time_range = Block::new()
            .with_attribute("from", Attribute::required_int64())
            .with_attribute("to", Attribute::required_int64());

        let data = Block::new()
            .with_attribute("ref_id", Attribute::required_string())
            .with_attribute("query_type", Attribute::optional_string())
            .with_attribute("datasource_uid", Attribute::required_string())
            .with_attribute(
                "model",
                Attribute::required_string().with_description("Query model as serialized JSON."),
            )
            .with_block(
                "relative_time_range",
                NestedBlock::single(relative_time_range).with_min_items(1),
            );

        let rule = Block::new()
            .with_attribute("uid", Attribute::optional_computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "for",
                Attribute::optional_string()
                    .with_default(json!("0"))
                    .with_description("How long the condition must hold before firing, e.g. `2m`."),
            )
            .with_attribute("condition", Attribute::required_string())
            .with_attribute(
                "no_data_state",
                Attribute::optional_string().with_default(json!("NoData")),
            )
            .with_attribute(
                "exec_err_state",
                Attribute::optional_string().with_default(json!("Alerting")),
            )
            .with_attribute("annotations", Attribute::string_map())
            .with_attribute("labels", Attribute::string_map())
            .with_attribute("is_paused", Attribute::optional_bool())
            .with_block("data", NestedBlock::list(data).with_min_items(1));

        Schema::v0()
            .with_description("Manages a group of alert rules")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "org_id",
                Attribute::optional_computed_string().with_force_new(),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("folder_uid", Attribute::required_string())
            .with_attribute(
                "interval_seconds",
                Attribute::required_int64().with_description("How often the rules are evaluated."),
            )
            .with_attribute(
                "disable_provenance",
                Attribute::optional_bool()
                    .with_description("Allow editing the rules in the Grafana UI."),
            )
            .with_block("rule", NestedBlock::list(rule).with_min_items(1))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if config.get("interval_seconds").is_some() && i64_attr(config, "interval_seconds") <= 0 {
            diagnostics.push(
                Diagnostic::error("interval_seconds must be positive")
                    .with_attribute("interval_seconds"),
            );
        }

        for (i, rule) in list_attr(config, "rule").iter().enumerate() {
            let path = format!("rule.{}", i);
            if let Some(value) = opt_str(rule, "for") {
                if canonical_duration(value).is_none() {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid duration '{}'", value))
                            .with_detail("Use a duration such as 30s, 2m or 1h30m")
                            .with_attribute(format!("{}.for", path)),
                    );
                }
            }
            check_enum(rule, "no_data_state", &NO_DATA_STATES, &path, &mut diagnostics);
            check_enum(rule, "exec_err_state", &EXEC_ERR_STATES, &path, &mut diagnostics);

            for (j, query) in list_attr(rule, "data").iter().enumerate() {
                if let Some(model) = opt_str(query, "model") {
                    if !matches!(serde_json::from_str::<Value>(model), Ok(Value::Object(_))) {
                        diagnostics.push(
                            Diagnostic::error("Invalid query model")
                                .with_detail("model must be a JSON object")
                                .with_attribute(format!("{}.data.{}.model", path, j)),
                        );
                    }
                }
            }
        }
        diagnostics
    }

    fn normalize(&self, planned: &mut Value) {
        let Some(rules) = planned.get_mut("rule").and_then(Value::as_array_mut) else {
            return;
        };
        for rule in rules {
            if let Some(canonical) = opt_str(rule, "for").and_then(canonical_duration) {
                rule["for"] = Value::String(canonical);
            }
            let Some(queries) = rule.get_mut("data").and_then(Value::as_array_mut) else {
                continue;
            };
            for query in queries {
                if let Some(model) = opt_str(query, "model").and_then(|m| normalize_model(m).ok()) {
                    query["model"] = Value::String(model);
                }
            }
        }
    }

    #[instrument(skip_all, fields(name = str_attr(planned, "name")))]
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError> {
        let (client, org_id) = ctx.client_for_new(planned);
        let folder_uid = str_attr(planned, "folder_uid");
        let name = str_attr(planned, "name");

        let existing = client.alert_rule_group(folder_uid, name).await;
        if found(existing, RULE_GROUP, name)?.is_some_and(|g| !g.rules.is_empty()) {
            return Err(ProviderError::AlreadyExists(format!(
                "rule group '{}' already exists in folder '{}'",
                name, folder_uid
            )));
        }

        let group = rule_group_from_state(planned, org_id)?;
        client
            .set_alert_rule_group(&group, bool_attr(planned, "disable_provenance"))
            .await?;
        info!(org_id, folder_uid, rules = group.rules.len(), "created rule group");

        let mut state = planned.clone();
        state["id"] = json!(org_resource_id(org_id, &rule_group_key(folder_uid, name)));
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn read(&self, ctx: &GrafanaContext, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(state)?;
        let (client, org_id, key) = ctx.client_for_id(id);
        let (folder_uid, name) = split_rule_group_key(key)?;

        let Some(group) = found(client.alert_rule_group(folder_uid, name).await, RULE_GROUP, id)? else {
            return Ok(None);
        };
        if group.rules.is_empty() {
            // Grafana answers with an empty group once every rule is gone.
            return Ok(None);
        }
        Ok(Some(rule_group_to_state(&group, org_id, state)))
    }

    #[instrument(skip_all, fields(id = str_attr(prior, "id")))]
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let (client, org_id, key) = ctx.client_for_id(state_id(prior)?);
        let (old_folder, old_name) = split_rule_group_key(key)?;
        let folder_uid = str_attr(planned, "folder_uid");
        let name = str_attr(planned, "name");

        if (old_folder, old_name) != (folder_uid, name) {
            debug!(old_folder, old_name, folder_uid, name, "moving rule group");
            delete_group_rules(&client, old_folder, old_name).await?;
        }

        let group = rule_group_from_state(planned, org_id)?;
        client
            .set_alert_rule_group(&group, bool_attr(planned, "disable_provenance"))
            .await?;

        let mut state = planned.clone();
        state["id"] = json!(org_resource_id(org_id, &rule_group_key(folder_uid, name)));
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError> {
        let (client, _, key) = ctx.client_for_id(state_id(state)?);
        let (folder_uid, name) = split_rule_group_key(key)?;
        delete_group_rules(&client, folder_uid, name).await
    }
}

/// Grafana has no rule group delete; a group disappears with its last rule.
async fn delete_group_rules(
    client: &GrafanaClient,
    folder_uid: &str,
    name: &str,
) -> Result<(), ProviderError> {
    let Some(group) = found(client.alert_rule_group(folder_uid, name).await, RULE_GROUP, name)? else {
        return Ok(());
    };
    for rule in &group.rules {
        found(client.delete_alert_rule(&rule.uid).await, RULE_GROUP, &rule.uid)?;
    }
    debug!(folder_uid, name, rules = group.rules.len(), "deleted rule group rules");
    Ok(())
}

fn check_enum(
    rule: &Value,
    key: &str,
    allowed: &[&str],
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(value) = opt_str(rule, key) {
        if !allowed.contains(&value) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid {} '{}'", key, value))
                    .with_detail(format!("Expected one of {}", allowed.join(", ")))
                    .with_attribute(format!("{}.{}", path, key)),
            );
        }
    }
}

fn rule_group_from_state(state: &Value, org_id: i64) -> Result<RuleGroup, ProviderError> {
    let folder_uid = str_attr(state, "folder_uid");
    let name = str_attr(state, "name");

    let rules = list_attr(state, "rule")
        .iter()
        .map(|rule| {
            let data = list_attr(rule, "data")
                .iter()
                .map(alert_query_from_state)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AlertRule {
                uid: str_attr(rule, "uid").to_string(),
                org_id,
                folder_uid: folder_uid.to_string(),
                rule_group: name.to_string(),
                title: str_attr(rule, "name").to_string(),
                condition: str_attr(rule, "condition").to_string(),
                data,
                no_data_state: opt_str(rule, "no_data_state").unwrap_or("NoData").to_string(),
                exec_err_state: opt_str(rule, "exec_err_state").unwrap_or("Alerting").to_string(),
                for_duration: opt_str(rule, "for")
                    .and_then(canonical_duration)
                    .unwrap_or_else(|| "0s".to_string()),
                annotations: string_map(rule, "annotations"),
                labels: string_map(rule, "labels"),
                is_paused: bool_attr(rule, "is_paused"),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    Ok(RuleGroup {
        title: name.to_string(),
        folder_uid: folder_uid.to_string(),
        interval: i64_attr(state, "interval_seconds"),
        rules,
    })
}

fn alert_query_from_state(query: &Value) -> Result<AlertQuery, ProviderError> {
    let range = single_block(query, "relative_time_range");
    let model = match opt_str(query, "model") {
        Some(text) => serde_json::from_str(text)?,
        None => json!({}),
    };
    Ok(AlertQuery {
        ref_id: str_attr(query, "ref_id").to_string(),
        query_type: str_attr(query, "query_type").to_string(),
        relative_time_range: RelativeTimeRange {
            from: range.map(|r| i64_attr(r, "from")).unwrap_or_default(),
            to: range.map(|r| i64_attr(r, "to")).unwrap_or_default(),
        },
        datasource_uid: str_attr(query, "datasource_uid").to_string(),
        model,
    })
}

fn rule_group_to_state(group: &RuleGroup, org_id: i64, prior: &Value) -> Value {
    let rules: Vec<Value> = group
        .rules
        .iter()
        .map(|rule| {
            let data: Vec<Value> = rule
                .data
                .iter()
                .map(|query| {
                    let model = query.model.to_string();
                    json!({
                        "ref_id": query.ref_id,
                        "query_type": query.query_type,
                        "datasource_uid": query.datasource_uid,
                        "model": normalize_model(&model).unwrap_or(model),
                        "relative_time_range": [{
                            "from": query.relative_time_range.from,
                            "to": query.relative_time_range.to,
                        }],
                    })
                })
                .collect();
            json!({
                "uid": rule.uid,
                "name": rule.title,
                "for": canonical_duration(&rule.for_duration).unwrap_or_else(|| rule.for_duration.clone()),
                "condition": rule.condition,
                "no_data_state": rule.no_data_state,
                "exec_err_state": rule.exec_err_state,
                "annotations": map_value(&rule.annotations),
                "labels": map_value(&rule.labels),
                "is_paused": rule.is_paused,
                "data": data,
            })
        })
        .collect();

    json!({
        "id": org_resource_id(org_id, &rule_group_key(&group.folder_uid, &group.title)),
        "org_id": org_id_value(org_id),
        "name": group.title,
        "folder_uid": group.folder_uid,
        "interval_seconds": group.interval,
        "disable_provenance": bool_attr(prior, "disable_provenance"),
        "rule": rules,
    })
}

/// Normalize a query model so that configuration and API output compare
/// equal: default `intervalMs` and `maxDataPoints` are dropped, `hide`
/// defaults to `false`, and keys are sorted.
///
/// ```
/// use grafana_provider::resources::normalize_model;
///
/// let model = normalize_model(r#"{"refId":"A","intervalMs":1000,"maxDataPoints":43200}"#).unwrap();
/// assert_eq!(model, r#"{"hide":false,"refId":"A"}"#);
/// ```
pub fn normalize_model(model: &str) -> Result<String, ProviderError> {
    let mut map: Map<String, Value> = match serde_json::from_str(model)? {
        Value::Object(map) => map,
        other => {
            return Err(ProviderError::Validation(format!(
                "query model must be a JSON object, got {}",
                other
            )))
        },
    };

    if map.get("intervalMs").and_then(Value::as_f64) == Some(DEFAULT_INTERVAL_MS as f64) {
        map.remove("intervalMs");
    }
    if map.get("maxDataPoints").and_then(Value::as_f64) == Some(DEFAULT_MAX_DATA_POINTS as f64) {
        map.remove("maxDataPoints");
    }
    map.entry("hide").or_insert(Value::Bool(false));

    Ok(Value::Object(map).to_string())
}

const MILLIS_PER_SECOND: u64 = 1000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: u64 = 7 * MILLIS_PER_DAY;
const MILLIS_PER_YEAR: u64 = 365 * MILLIS_PER_DAY;

/// Rewrite a duration in its shortest form (`2m0s` and `120s` become `2m`).
/// `None` if the text is not a duration.
pub(crate) fn canonical_duration(text: &str) -> Option<String> {
    Some(format_duration(parse_duration(text)?))
}

fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text == "0" {
        return Some(0);
    }

    let mut total = 0u64;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let multiplier = match &rest[..unit_len] {
            "ms" => 1,
            "s" => MILLIS_PER_SECOND,
            "m" => MILLIS_PER_MINUTE,
            "h" => MILLIS_PER_HOUR,
            "d" => MILLIS_PER_DAY,
            "w" => MILLIS_PER_WEEK,
            "y" => MILLIS_PER_YEAR,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(multiplier)?)?;
        rest = &rest[unit_len..];
    }
    (!text.is_empty()).then_some(total)
}

fn format_duration(mut millis: u64) -> String {
    if millis == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    // Years and weeks are only used when they divide evenly.
    for (unit, size, exact) in [
        ("y", MILLIS_PER_YEAR, true),
        ("w", MILLIS_PER_WEEK, true),
        ("d", MILLIS_PER_DAY, false),
        ("h", MILLIS_PER_HOUR, false),
        ("m", MILLIS_PER_MINUTE, false),
        ("s", MILLIS_PER_SECOND, false),
        ("ms", 1, false),
    ] {
        if exact && millis % size != 0 {
            continue;
        }
        let count = millis / size;
        if count > 0 {
            out.push_str(&format!("{}{}", count, unit));
            millis -= count * size;
        }
    }
    out
}
