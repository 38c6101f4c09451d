//! The Grafana provider: dispatch from the host's lifecycle calls to the
//! resource and lookup implementations.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::client::GrafanaClient;
use crate::config::{provider_schema, ProviderConfig};
use crate::error::ProviderError;
use crate::lookups::{DataSourceLookup, FolderLookup, Lookup, OrganizationPreferencesLookup};
use crate::plan::plan_resource;
use crate::resources::{
    DataSourceResource, FolderResource, GrafanaContext, OrganizationResource,
    PublicDashboardResource, Resource, RuleGroupResource, SloResource,
};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation;

/// Serves every Grafana resource and lookup.
///
/// Resource operations fail with a configuration error until
/// [`ProviderService::configure`] has succeeded.
pub struct GrafanaProvider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    lookups: BTreeMap<&'static str, Box<dyn Lookup>>,
    context: RwLock<Option<GrafanaContext>>,
}

impl Default for GrafanaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GrafanaProvider {
    /// A provider with every resource and lookup registered.
    pub fn new() -> Self {
        let resources: Vec<Box<dyn Resource>> = vec![
            Box::new(DataSourceResource),
            Box::new(FolderResource),
            Box::new(OrganizationResource),
            Box::new(PublicDashboardResource),
            Box::new(RuleGroupResource),
            Box::new(SloResource),
        ];
        let lookups: Vec<Box<dyn Lookup>> = vec![
            Box::new(DataSourceLookup),
            Box::new(FolderLookup),
            Box::new(OrganizationPreferencesLookup),
        ];
        Self {
            resources: resources.into_iter().map(|r| (r.type_name(), r)).collect(),
            lookups: lookups.into_iter().map(|l| (l.type_name(), l)).collect(),
            context: RwLock::new(None),
        }
    }

    /// A provider that is already configured with `client`.
    pub fn with_client(client: GrafanaClient, default_org_id: i64) -> Self {
        Self {
            context: RwLock::new(Some(GrafanaContext::new(client, default_org_id))),
            ..Self::new()
        }
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn lookup(&self, data_source_type: &str) -> Result<&dyn Lookup, ProviderError> {
        self.lookups
            .get(data_source_type)
            .map(|l| l.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    async fn context(&self) -> Result<GrafanaContext, ProviderError> {
        self.context.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("the provider has not been configured".to_string())
        })
    }

    fn parse_config(config: &Value) -> Result<(ProviderConfig, Vec<Diagnostic>), ProviderError> {
        let config = ProviderConfig::from_value(config)?.with_env_fallbacks();
        let diagnostics = config.validate();
        Ok((config, diagnostics))
    }
}

#[async_trait::async_trait]
impl ProviderService for GrafanaProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(provider_schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for (name, lookup) in &self.lookups {
            schema = schema.with_data_source(*name, lookup.schema());
        }
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.lookups.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&provider_schema(), &config);
        diagnostics.extend(Self::parse_config(&config)?.1);
        Ok(diagnostics)
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let (config, diagnostics) = Self::parse_config(&config)?;
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let client = GrafanaClient::new(config.client_settings()?)?;
        info!(url = client.base_url(), org_id = config.org_id(), "configured Grafana client");
        *self.context.write().await = Some(GrafanaContext::new(client, config.org_id()));
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let mut diagnostics = validation::validate(&resource.schema(), &config);
        diagnostics.extend(resource.validate(&config));
        Ok(diagnostics)
    }

    #[instrument(skip_all, fields(resource_type = %resource_type))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        let plan = plan_resource(resource, prior_state.as_ref(), proposed_state);
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "planned"
        );
        Ok(plan)
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.create(&self.context().await?, &planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let state = resource.read(&self.context().await?, &current_state).await?;
        Ok(state.unwrap_or(Value::Null))
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource
            .update(&self.context().await?, &prior_state, &planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.delete(&self.context().await?, &current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let state = resource.import(&self.context().await?, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let lookup = self.lookup(data_source_type)?;
        let mut diagnostics = validation::validate(&lookup.schema(), &config);
        diagnostics.extend(lookup.validate(&config));
        Ok(diagnostics)
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let lookup = self.lookup(data_source_type)?;
        lookup.read(&self.context().await?, &config).await
    }
}
