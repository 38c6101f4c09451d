//! `grafana_organization_preferences`.

use serde_json::{json, Value};
use tracing::instrument;

use super::Lookup;
use crate::error::ProviderError;
use crate::resources::GrafanaContext;
use crate::schema::{Attribute, Schema};

/// Data source type name.
pub const ORGANIZATION_PREFERENCES: &str = "grafana_organization_preferences";

const ID: &str = "organization_preferences";

/// Preferences of the provider's organization, or of `org_id`.
#[derive(Debug, Default)]
pub struct OrganizationPreferencesLookup;

#[async_trait::async_trait]
impl Lookup for OrganizationPreferencesLookup {
    fn type_name(&self) -> &'static str {
        ORGANIZATION_PREFERENCES
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Reads an organization's preferences")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("org_id", Attribute::optional_computed_string())
            .with_attribute("theme", Attribute::computed_string())
            .with_attribute("home_dashboard_id", Attribute::computed_int64())
            .with_attribute("home_dashboard_uid", Attribute::computed_string())
            .with_attribute("timezone", Attribute::computed_string())
            .with_attribute("week_start", Attribute::computed_string())
    }

    #[instrument(skip_all)]
    async fn read(&self, ctx: &GrafanaContext, config: &Value) -> Result<Value, ProviderError> {
        let (client, org_id) = ctx.client_for_new(config);
        let prefs = client.org_preferences().await?;
        Ok(json!({
            "id": ID,
            "org_id": org_id.to_string(),
            "theme": prefs.theme,
            "home_dashboard_id": prefs.home_dashboard_id,
            "home_dashboard_uid": prefs.home_dashboard_uid,
            "timezone": prefs.timezone,
            "week_start": prefs.week_start,
        }))
    }
}
