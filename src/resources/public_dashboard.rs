//! `grafana_dashboard_public` (Grafana 10.2+).

use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{found, org_id_value, read_back, state_id, GrafanaContext, Resource};
use crate::client::PublicDashboard;
use crate::error::ProviderError;
use crate::ids::{public_dashboard_id, split_public_dashboard_id};
use crate::schema::{Attribute, Schema};
use crate::state::{bool_attr, str_attr};

/// Resource type name.
pub const PUBLIC_DASHBOARD: &str = "grafana_dashboard_public";

/// A dashboard shared publicly.
#[derive(Debug, Default)]
pub struct PublicDashboardResource;

#[async_trait::async_trait]
impl Resource for PublicDashboardResource {
    fn type_name(&self) -> &'static str {
        PUBLIC_DASHBOARD
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Manages Grafana public dashboards")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "org_id",
                Attribute::optional_computed_string().with_force_new(),
            )
            .with_attribute(
                "uid",
                Attribute::optional_computed_string()
                    .with_description("Generated when not provided."),
            )
            .with_attribute(
                "dashboard_uid",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The dashboard being shared."),
            )
            .with_attribute(
                "access_token",
                Attribute::optional_computed_string()
                    .with_description("Public identifier used in the dashboard's public URL."),
            )
            .with_attribute("time_selection_enabled", Attribute::optional_bool())
            .with_attribute("is_enabled", Attribute::optional_bool())
            .with_attribute("annotations_enabled", Attribute::optional_bool())
            .with_attribute(
                "share",
                Attribute::optional_computed_string()
                    .with_description("Share mode. Grafana defaults to `public`."),
            )
    }

    #[instrument(skip_all, fields(dashboard_uid = str_attr(planned, "dashboard_uid")))]
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError> {
        let (client, org_id) = ctx.client_for_new(planned);
        let created = client
            .new_public_dashboard(str_attr(planned, "dashboard_uid"), &payload(planned))
            .await?;
        info!(org_id, uid = %created.uid, "published dashboard");

        let state = json!({
            "id": public_dashboard_id(org_id, &created.dashboard_uid, &created.uid),
        });
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn read(&self, ctx: &GrafanaContext, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(state)?;
        let (org_id, dashboard_uid, _) = split_public_dashboard_id(id)?;
        let client = ctx.client().with_org_id(org_id);

        let result = client.public_dashboard_by_dashboard_uid(dashboard_uid).await;
        Ok(found(result, PUBLIC_DASHBOARD, id)?.map(|pd| to_state(&pd, org_id)))
    }

    #[instrument(skip_all, fields(id = str_attr(prior, "id")))]
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let (org_id, dashboard_uid, uid) = split_public_dashboard_id(state_id(prior)?)?;
        let client = ctx.client().with_org_id(org_id);
        let updated = client
            .update_public_dashboard(dashboard_uid, uid, &payload(planned))
            .await?;

        let state = json!({
            "id": public_dashboard_id(org_id, &updated.dashboard_uid, &updated.uid),
        });
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError> {
        let id = state_id(state)?;
        let (org_id, dashboard_uid, uid) = split_public_dashboard_id(id)?;
        let client = ctx.client().with_org_id(org_id);
        found(client.delete_public_dashboard(dashboard_uid, uid).await, PUBLIC_DASHBOARD, id)?;
        Ok(())
    }
}

fn payload(state: &Value) -> PublicDashboard {
    PublicDashboard {
        uid: str_attr(state, "uid").to_string(),
        dashboard_uid: String::new(),
        access_token: str_attr(state, "access_token").to_string(),
        time_selection_enabled: bool_attr(state, "time_selection_enabled"),
        is_enabled: bool_attr(state, "is_enabled"),
        annotations_enabled: bool_attr(state, "annotations_enabled"),
        share: str_attr(state, "share").to_string(),
    }
}

fn to_state(pd: &PublicDashboard, org_id: i64) -> Value {
    json!({
        "id": public_dashboard_id(org_id, &pd.dashboard_uid, &pd.uid),
        "org_id": org_id_value(org_id),
        "uid": pd.uid,
        "dashboard_uid": pd.dashboard_uid,
        "access_token": pd.access_token,
        "time_selection_enabled": pd.time_selection_enabled,
        "is_enabled": pd.is_enabled,
        "annotations_enabled": pd.annotations_enabled,
        "share": pd.share,
    })
}
