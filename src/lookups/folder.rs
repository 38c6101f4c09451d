//! `grafana_folder` lookup by title.

use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::Lookup;
use crate::error::ProviderError;
use crate::ids::org_resource_id;
use crate::resources::GrafanaContext;
use crate::schema::{Attribute, Schema};
use crate::state::str_attr;

/// Data source type name.
pub const FOLDER_LOOKUP: &str = "grafana_folder";

/// Finds a folder by its title.
#[derive(Debug, Default)]
pub struct FolderLookup;

#[async_trait::async_trait]
impl Lookup for FolderLookup {
    fn type_name(&self) -> &'static str {
        FOLDER_LOOKUP
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Reads a folder by title")
            .with_attribute("title", Attribute::required_string())
            .with_attribute("org_id", Attribute::optional_computed_string())
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("uid", Attribute::computed_string())
            .with_attribute("url", Attribute::computed_string())
            .with_attribute("parent_folder_uid", Attribute::computed_string())
    }

    #[instrument(skip_all, fields(title = str_attr(config, "title")))]
    async fn read(&self, ctx: &GrafanaContext, config: &Value) -> Result<Value, ProviderError> {
        let title = str_attr(config, "title");
        let (client, org_id) = ctx.client_for_new(config);
        let hits = client.search_folders(title).await?;
        debug!(count = hits.len(), "searched folders");

        // Search matches substrings; the title must match exactly.
        let hit = hits
            .into_iter()
            .find(|f| f.title == title)
            .ok_or_else(|| ProviderError::NotFound(format!("no folder titled '{}'", title)))?;
        // Search hits carry no parent.
        let folder = client.folder_by_uid(&hit.uid).await?;
        let url = if folder.url.starts_with('/') {
            format!("{}{}", client.base_url().trim_end_matches('/'), folder.url)
        } else {
            folder.url
        };

        Ok(json!({
            "title": folder.title,
            "org_id": org_id.to_string(),
            "id": org_resource_id(org_id, &folder.uid),
            "uid": folder.uid,
            "url": url,
            "parent_folder_uid": folder.parent_uid.unwrap_or_default(),
        }))
    }
}
