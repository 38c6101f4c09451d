//! Read-only lookups, exposed to the host as data sources.

mod data_source;
mod folder;
mod organization_preferences;

use serde_json::Value;

use crate::error::ProviderError;
use crate::resources::GrafanaContext;
use crate::schema::{Diagnostic, Schema};

pub use data_source::{DataSourceLookup, DATA_SOURCE_LOOKUP};
pub use folder::{FolderLookup, FOLDER_LOOKUP};
pub use organization_preferences::{OrganizationPreferencesLookup, ORGANIZATION_PREFERENCES};

/// A Grafana object read by its configured key.
#[async_trait::async_trait]
pub trait Lookup: Send + Sync {
    /// Type name, e.g. `grafana_folder`.
    fn type_name(&self) -> &'static str;

    /// Arguments and the attributes the lookup fills in.
    fn schema(&self) -> Schema;

    /// Checks beyond what the schema expresses.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// Find the object and return its attributes.
    async fn read(&self, ctx: &GrafanaContext, config: &Value) -> Result<Value, ProviderError>;
}
