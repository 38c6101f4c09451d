//! Folder API.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use super::{decode, GrafanaClient, GrafanaError};

/// Page size for `/api/search`.
pub const SEARCH_PAGE_LIMIT: usize = 1000;

/// A dashboard folder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<String>,
    #[serde(default)]
    pub version: i64,
}

impl GrafanaClient {
    /// Create a folder. An empty `uid` lets Grafana generate one.
    #[instrument(skip(self))]
    pub async fn new_folder(
        &self,
        uid: &str,
        title: &str,
        parent_uid: Option<&str>,
    ) -> Result<Folder, GrafanaError> {
        let mut body = json!({ "title": title });
        if !uid.is_empty() {
            body["uid"] = json!(uid);
        }
        if let Some(parent) = parent_uid.filter(|p| !p.is_empty()) {
            body["parentUid"] = json!(parent);
        }
        let value = self.send(Method::POST, &["api", "folders"], &body).await?;
        decode(value, "folder")
    }

    /// Fetch a folder by UID.
    #[instrument(skip(self))]
    pub async fn folder_by_uid(&self, uid: &str) -> Result<Folder, GrafanaError> {
        self.get(&["api", "folders", uid], "folder").await
    }

    /// Folders at any depth whose title contains `query`, following search
    /// pages until a short one. Hits carry `uid`, `title` and `url` only.
    #[instrument(skip(self))]
    pub async fn search_folders(&self, query: &str) -> Result<Vec<Folder>, GrafanaError> {
        let limit = SEARCH_PAGE_LIMIT.to_string();
        let mut folders = Vec::new();
        for page in 1u32.. {
            let page = page.to_string();
            let request = self
                .request(Method::GET, self.url(&["api", "search"]))
                .query(&[
                    ("type", "dash-folder"),
                    ("query", query),
                    ("limit", limit.as_str()),
                    ("page", page.as_str()),
                ]);
            let hits: Vec<Folder> = decode(self.execute(request).await?, "folder search")?;
            let last_page = hits.len() < SEARCH_PAGE_LIMIT;
            folders.extend(hits);
            if last_page {
                break;
            }
        }
        Ok(folders)
    }

    /// Rename a folder or change its UID. `overwrite` skips the version check.
    #[instrument(skip(self))]
    pub async fn update_folder(
        &self,
        uid: &str,
        new_uid: &str,
        title: &str,
    ) -> Result<Folder, GrafanaError> {
        let body = json!({
            "uid": new_uid,
            "title": title,
            "overwrite": true,
        });
        let value = self
            .send(Method::PUT, &["api", "folders", uid], &body)
            .await?;
        decode(value, "folder")
    }

    /// Delete a folder. With `force_delete_rules` the alert rules stored in
    /// the folder are deleted too; otherwise Grafana refuses non-empty folders.
    #[instrument(skip(self))]
    pub async fn delete_folder(
        &self,
        uid: &str,
        force_delete_rules: bool,
    ) -> Result<(), GrafanaError> {
        let mut request = self.request(Method::DELETE, self.url(&["api", "folders", uid]));
        if force_delete_rules {
            request = request.query(&[("forceDeleteRules", "true")]);
        }
        self.execute(request).await.map(|_| ())
    }
}
