//! Organization, membership and preference API.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use super::{decode, GrafanaClient, GrafanaError};

/// An organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub id: i64,
    pub name: String,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUser {
    #[serde(default)]
    pub org_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub login: String,
    pub role: String,
}

/// Preferences of the current organization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgPreferences {
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub home_dashboard_id: i64,
    #[serde(rename = "homeDashboardUID", default)]
    pub home_dashboard_uid: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub week_start: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedOrg {
    org_id: i64,
}

impl GrafanaClient {
    /// Create an organization and return its ID.
    #[instrument(skip(self))]
    pub async fn new_org(&self, name: &str) -> Result<i64, GrafanaError> {
        let value = self
            .send(Method::POST, &["api", "orgs"], &json!({ "name": name }))
            .await?;
        decode::<CreatedOrg>(value, "organization").map(|o| o.org_id)
    }

    /// Fetch an organization by ID.
    #[instrument(skip(self))]
    pub async fn org(&self, id: i64) -> Result<Org, GrafanaError> {
        self.get(&["api", "orgs", &id.to_string()], "organization")
            .await
    }

    /// Rename an organization.
    #[instrument(skip(self))]
    pub async fn update_org(&self, id: i64, name: &str) -> Result<(), GrafanaError> {
        self.send(
            Method::PUT,
            &["api", "orgs", &id.to_string()],
            &json!({ "name": name }),
        )
        .await
        .map(|_| ())
    }

    /// Delete an organization and everything in it.
    #[instrument(skip(self))]
    pub async fn delete_org(&self, id: i64) -> Result<(), GrafanaError> {
        self.delete(&["api", "orgs", &id.to_string()]).await
    }

    /// Members of an organization.
    #[instrument(skip(self))]
    pub async fn org_users(&self, org_id: i64) -> Result<Vec<OrgUser>, GrafanaError> {
        self.get(
            &["api", "orgs", &org_id.to_string(), "users"],
            "organization users",
        )
        .await
    }

    /// Add an existing user to an organization.
    #[instrument(skip(self))]
    pub async fn add_org_user(
        &self,
        org_id: i64,
        login_or_email: &str,
        role: &str,
    ) -> Result<(), GrafanaError> {
        self.send(
            Method::POST,
            &["api", "orgs", &org_id.to_string(), "users"],
            &json!({ "loginOrEmail": login_or_email, "role": role }),
        )
        .await
        .map(|_| ())
    }

    /// Change a member's role.
    #[instrument(skip(self))]
    pub async fn update_org_user(
        &self,
        org_id: i64,
        user_id: i64,
        role: &str,
    ) -> Result<(), GrafanaError> {
        self.send(
            Method::PATCH,
            &[
                "api",
                "orgs",
                &org_id.to_string(),
                "users",
                &user_id.to_string(),
            ],
            &json!({ "role": role }),
        )
        .await
        .map(|_| ())
    }

    /// Remove a member.
    #[instrument(skip(self))]
    pub async fn remove_org_user(&self, org_id: i64, user_id: i64) -> Result<(), GrafanaError> {
        self.delete(&[
            "api",
            "orgs",
            &org_id.to_string(),
            "users",
            &user_id.to_string(),
        ])
        .await
    }

    /// Preferences of the org this client is scoped to.
    #[instrument(skip(self))]
    pub async fn org_preferences(&self) -> Result<OrgPreferences, GrafanaError> {
        self.get(&["api", "org", "preferences"], "organization preferences")
            .await
    }
}
