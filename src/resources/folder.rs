//! `grafana_folder`.

use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{found, org_id_value, read_back, state_id, GrafanaContext, Resource};
use crate::client::Folder;
use crate::error::ProviderError;
use crate::ids::org_resource_id;
use crate::schema::{Attribute, Schema};
use crate::state::{bool_attr, opt_str, str_attr};

/// Resource type name.
pub const FOLDER: &str = "grafana_folder";

/// A dashboard and alert rule folder.
#[derive(Debug, Default)]
pub struct FolderResource;

#[async_trait::async_trait]
impl Resource for FolderResource {
    fn type_name(&self) -> &'static str {
        FOLDER
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Manages a folder")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "org_id",
                Attribute::optional_computed_string().with_force_new(),
            )
            .with_attribute("uid", Attribute::optional_computed_string())
            .with_attribute("title", Attribute::required_string())
            .with_attribute(
                "parent_folder_uid",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("Nest this folder under another. Requires nested folders."),
            )
            .with_attribute("url", Attribute::computed_string())
            .with_attribute(
                "prevent_destroy_if_not_empty",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Refuse to delete the folder while it holds alert rules."),
            )
    }

    #[instrument(skip_all, fields(title = str_attr(planned, "title")))]
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError> {
        let (client, org_id) = ctx.client_for_new(planned);
        let folder = client
            .new_folder(
                str_attr(planned, "uid"),
                str_attr(planned, "title"),
                opt_str(planned, "parent_folder_uid"),
            )
            .await?;
        info!(org_id, uid = %folder.uid, "created folder");

        let mut state = planned.clone();
        state["id"] = json!(org_resource_id(org_id, &folder.uid));
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn read(&self, ctx: &GrafanaContext, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(state)?;
        let (client, org_id, uid) = ctx.client_for_id(id);
        let Some(folder) = found(client.folder_by_uid(uid).await, FOLDER, id)? else {
            return Ok(None);
        };
        Ok(Some(folder_to_state(&folder, org_id, state, ctx.client().base_url())))
    }

    #[instrument(skip_all, fields(id = str_attr(prior, "id")))]
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let (client, org_id, uid) = ctx.client_for_id(state_id(prior)?);
        let new_uid = opt_str(planned, "uid").unwrap_or(uid);
        let folder = client
            .update_folder(uid, new_uid, str_attr(planned, "title"))
            .await?;

        let mut state = planned.clone();
        state["id"] = json!(org_resource_id(org_id, &folder.uid));
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError> {
        let id = state_id(state)?;
        let (client, _, uid) = ctx.client_for_id(id);
        let force = !bool_attr(state, "prevent_destroy_if_not_empty");
        found(client.delete_folder(uid, force).await, FOLDER, id)?;
        Ok(())
    }
}

/// Folder URLs from the API are relative to the Grafana root.
fn folder_to_state(folder: &Folder, org_id: i64, prior: &Value, base_url: &str) -> Value {
    let url = if folder.url.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), folder.url)
    } else {
        folder.url.clone()
    };
    json!({
        "id": org_resource_id(org_id, &folder.uid),
        "org_id": org_id_value(org_id),
        "uid": folder.uid,
        "title": folder.title,
        "parent_folder_uid": folder.parent_uid.clone().filter(|p| !p.is_empty()),
        "url": url,
        "prevent_destroy_if_not_empty": bool_attr(prior, "prevent_destroy_if_not_empty"),
    })
}
