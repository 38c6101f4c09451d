//! Helpers for exercising a provider without a gRPC server.
//!
//! [`ProviderTester`] drives a [`ProviderService`] the way the host does:
//! validate, plan, apply the planned state, then refresh and plan again to
//! check for drift. Pair it with a mock HTTP server to test resources end to
//! end.
//!
//! ```ignore
//! use grafana_provider::testing::{assert_plan_no_changes, ProviderTester};
//! use serde_json::json;
//!
//! let tester = ProviderTester::configured(&mock_server.uri()).await?;
//! let config = json!({"title": "Alerts"});
//! let state = tester.apply("grafana_folder", None, config.clone()).await?;
//! assert_plan_no_changes(&tester.refresh_plan("grafana_folder", state, config).await?);
//! ```

use serde_json::{json, Value};
use thiserror::Error;

use crate::error::ProviderError;
use crate::provider::GrafanaProvider;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Drives a provider through host-like lifecycles.
pub struct ProviderTester<P: ProviderService = GrafanaProvider> {
    provider: P,
}

impl ProviderTester<GrafanaProvider> {
    /// A Grafana provider configured against `url`, typically a mock server.
    pub async fn configured(url: &str) -> Result<Self, TestError> {
        let tester = Self::new(GrafanaProvider::new());
        tester
            .configure(json!({ "url": url, "auth": "admin:admin", "retries": 0 }))
            .await?;
        Ok(tester)
    }
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's schemas.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        check_diagnostics(self.provider.configure(config).await?)
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        check_diagnostics(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    /// Plan a create.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan moving `prior` to `config`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), config.clone(), config)
            .await
    }

    /// Plan a destroy.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), Value::Null, Value::Null)
            .await
    }

    /// Create from a planned state.
    pub async fn create(&self, resource_type: &str, planned: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned).await
    }

    /// Refresh a state. `null` means the remote object is gone.
    pub async fn read(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Update from a planned state.
    pub async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.update(resource_type, prior, planned).await
    }

    /// Delete.
    pub async fn delete(&self, resource_type: &str, state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, state).await
    }

    /// Import by ID.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a lookup.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// Validate, plan and apply `config` on top of `prior`, returning the new
    /// state. A replacement deletes the prior object first.
    pub async fn apply(
        &self,
        resource_type: &str,
        prior: Option<Value>,
        config: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;

        let Some(prior) = prior else {
            let plan = self.plan_create(resource_type, config).await?;
            return Ok(self.create(resource_type, plan.planned_state).await?);
        };

        let plan = self
            .plan_update(resource_type, prior.clone(), config)
            .await?;
        if plan.requires_replace {
            self.delete(resource_type, prior).await?;
            return Ok(self.create(resource_type, plan.planned_state).await?);
        }
        if plan.changes.is_empty() {
            return Ok(prior);
        }
        Ok(self
            .update(resource_type, prior, plan.planned_state)
            .await?)
    }

    /// Refresh `state` and plan `config` against it. An empty plan means
    /// the configuration and the remote object agree.
    pub async fn refresh_plan(
        &self,
        resource_type: &str,
        state: Value,
        config: Value,
    ) -> Result<PlanResult, TestError> {
        let refreshed = self.read(resource_type, state).await?;
        if refreshed.is_null() {
            return Err(TestError::Gone(resource_type.to_string()));
        }
        Ok(self.plan_update(resource_type, refreshed, config).await?)
    }
}

/// Failure of a tester operation.
#[derive(Debug, Error)]
pub enum TestError {
    /// The provider answered with error diagnostics.
    #[error("{}", describe(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// A refresh found no remote object.
    #[error("{0} vanished during refresh")]
    Gone(String),
}

fn describe(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| {
            let mut line = d.summary.clone();
            if let Some(detail) = &d.detail {
                line.push_str(": ");
                line.push_str(detail);
            }
            if let Some(attribute) = &d.attribute {
                line.push_str(&format!(" (at {})", attribute));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// The plan creates a new object.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "expected a create, got no changes");
    assert!(!plan.requires_replace, "expected a create, got a replacement");
}

/// The plan changes nothing.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "expected no changes, got {:?}",
        changed_paths(plan)
    );
}

/// The plan destroys and recreates the object.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(plan.requires_replace, "expected a replacement");
}

/// The plan updates the object in place.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "expected an update, got no changes");
    assert!(!plan.requires_replace, "expected an in-place update, got a replacement");
}

/// The plan changes `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "expected a change to '{}', got {:?}",
        path,
        changed_paths(plan)
    );
}

/// No error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| &d.summary)
        .collect();
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Some error diagnostic's summary contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "expected an error containing '{}', got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}
