//! Public dashboard API.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{decode, GrafanaClient, GrafanaError};

/// A public (shared) view of a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDashboard {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dashboard_uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(default)]
    pub time_selection_enabled: bool,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub annotations_enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub share: String,
}

impl GrafanaClient {
    /// Publish a dashboard.
    #[instrument(skip(self, payload))]
    pub async fn new_public_dashboard(
        &self,
        dashboard_uid: &str,
        payload: &PublicDashboard,
    ) -> Result<PublicDashboard, GrafanaError> {
        let value = self
            .send(
                Method::POST,
                &["api", "dashboards", "uid", dashboard_uid, "public-dashboards"],
                payload,
            )
            .await?;
        decode(value, "public dashboard")
    }

    /// Change the settings of a public dashboard.
    #[instrument(skip(self, payload))]
    pub async fn update_public_dashboard(
        &self,
        dashboard_uid: &str,
        uid: &str,
        payload: &PublicDashboard,
    ) -> Result<PublicDashboard, GrafanaError> {
        let value = self
            .send(
                Method::PATCH,
                &[
                    "api",
                    "dashboards",
                    "uid",
                    dashboard_uid,
                    "public-dashboards",
                    uid,
                ],
                payload,
            )
            .await?;
        decode(value, "public dashboard")
    }

    /// The public dashboard of a dashboard (there is at most one).
    #[instrument(skip(self))]
    pub async fn public_dashboard_by_dashboard_uid(
        &self,
        dashboard_uid: &str,
    ) -> Result<PublicDashboard, GrafanaError> {
        self.get(
            &["api", "dashboards", "uid", dashboard_uid, "public-dashboards"],
            "public dashboard",
        )
        .await
    }

    /// Unpublish a dashboard.
    #[instrument(skip(self))]
    pub async fn delete_public_dashboard(
        &self,
        dashboard_uid: &str,
        uid: &str,
    ) -> Result<(), GrafanaError> {
        self.delete(&[
            "api",
            "dashboards",
            "uid",
            dashboard_uid,
            "public-dashboards",
            uid,
        ])
        .await
    }
}
