//! gRPC server for the provider protocol.
//!
//! [`ProviderService`] is the JSON-valued seam the provider implements. The
//! adapter in this module decodes protocol messages, calls the service, and
//! turns every failure into an error diagnostic so the host can show it to
//! the user.
//!
//! # Signal handling
//!
//! On SIGTERM or SIGINT the server stops accepting connections, waits up to
//! [`ServeOptions::shutdown_timeout`] for in-flight requests, then calls
//! [`ProviderService::stop`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::protocol::{self, ProviderServer};
use crate::schema::{self, has_errors, Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// Lifecycle operations of a provider, expressed over JSON values.
///
/// Only the schema, configuration and the resource CRUD operations are
/// mandatory; everything else has a conservative default.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Schemas of the provider configuration, resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Type names and capabilities, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Check the provider configuration without applying it.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Apply the provider configuration.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Release resources before exit.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Migrate state written by an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Compute the changes needed to reach `proposed_state`. A null proposed
    /// state plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the remote object and return its state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh state from the remote object. `null` means it is gone.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update the remote object and return its new state.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Bring an existing remote object under management.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    /// Check a data source configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read a data source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let _ = config;
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

/// Adapter from the protocol service to a [`ProviderService`].
pub(crate) struct ProviderGrpc<P: ProviderService> {
    provider: Arc<P>,
}

impl<P: ProviderService> ProviderGrpc<P> {
    pub(crate) fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

/// Empty payloads decode to `null`.
fn decode_json(bytes: &[u8]) -> Result<Value, ProviderError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn encode_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<protocol::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| protocol::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => protocol::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => protocol::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_diagnostics(err: &ProviderError) -> Vec<protocol::Diagnostic> {
    diagnostics_to_proto(vec![Diagnostic::error(err.to_string())])
}

fn log_diagnostics(operation: &str, subject: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(operation, subject, diagnostics = diagnostics.len(), "completed with errors");
    } else {
        debug!(operation, subject, "completed");
    }
}

fn schema_to_proto(schema: &schema::Schema) -> protocol::Schema {
    protocol::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &schema::Block) -> protocol::Block {
    use protocol::nested_block::NestingMode;

    protocol::Block {
        attributes: block
            .attributes
            .iter()
            .map(|(name, attr)| protocol::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                default_value: attr.default.as_ref().map(encode_json).unwrap_or_default(),
            })
            .collect(),
        block_types: block
            .blocks
            .iter()
            .map(|(name, nested)| protocol::NestedBlock {
                type_name: name.clone(),
                block: Some(block_to_proto(&nested.block)),
                nesting_mode: match nested.nesting_mode {
                    schema::BlockNestingMode::Single => NestingMode::Single as i32,
                    schema::BlockNestingMode::List => NestingMode::List as i32,
                },
                min_items: nested.min_items as i32,
                max_items: nested.max_items as i32,
            })
            .collect(),
        description: block.description.clone().unwrap_or_default(),
    }
}

#[async_trait::async_trait]
impl<P: ProviderService> protocol::service::Provider for ProviderGrpc<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<protocol::GetMetadataRequest>,
    ) -> Result<Response<protocol::GetMetadataResponse>, Status> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata"
        );
        Ok(Response::new(protocol::GetMetadataResponse {
            server_capabilities: Some(protocol::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<protocol::GetSchemaRequest>,
    ) -> Result<Response<protocol::GetSchemaResponse>, Status> {
        let schema = self.provider.schema();
        Ok(Response::new(protocol::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(name, s)| (name.clone(), schema_to_proto(s)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(name, s)| (name.clone(), schema_to_proto(s)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<protocol::ValidateProviderConfigRequest>,
    ) -> Result<Response<protocol::ValidateProviderConfigResponse>, Status> {
        let req = request.into_inner();
        let result = match decode_json(&req.config) {
            Ok(config) => self.provider.validate_provider_config(config).await,
            Err(e) => Err(e),
        };
        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateProviderConfig", "provider", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                error_diagnostics(&e)
            },
        };
        Ok(Response::new(protocol::ValidateProviderConfigResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<protocol::ConfigureRequest>,
    ) -> Result<Response<protocol::ConfigureResponse>, Status> {
        let req = request.into_inner();
        let result = match decode_json(&req.config) {
            Ok(config) => self.provider.configure(config).await,
            Err(e) => Err(e),
        };
        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("Configure", "provider", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_diagnostics(&e)
            },
        };
        Ok(Response::new(protocol::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: Request<protocol::StopRequest>,
    ) -> Result<Response<protocol::StopResponse>, Status> {
        info!("Stop requested");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(Response::new(protocol::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(resource_type))]
    async fn validate_resource_config(
        &self,
        request: Request<protocol::ValidateResourceConfigRequest>,
    ) -> Result<Response<protocol::ValidateResourceConfigResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode_json(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_resource_config(&req.resource_type, config)
                    .await
            },
            Err(e) => Err(e),
        };
        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateResourceConfig", &req.resource_type, &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateResourceConfig failed");
                error_diagnostics(&e)
            },
        };
        Ok(Response::new(protocol::ValidateResourceConfigResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(resource_type))]
    async fn upgrade_resource_state(
        &self,
        request: Request<protocol::UpgradeResourceStateRequest>,
    ) -> Result<Response<protocol::UpgradeResourceStateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode_json(&req.raw_state) {
            Ok(state) => {
                self.provider
                    .upgrade_resource_state(&req.resource_type, req.version, state)
                    .await
            },
            Err(e) => Err(e),
        };
        Ok(Response::new(match result {
            Ok(upgraded) => protocol::UpgradeResourceStateResponse {
                upgraded_state: encode_json(&upgraded),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(version = req.version, error = %e, "UpgradeResourceState failed");
                protocol::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            },
        }))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type))]
    async fn plan(
        &self,
        request: Request<protocol::PlanRequest>,
    ) -> Result<Response<protocol::PlanResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result: Result<PlanResult, ProviderError> = async {
            let prior_state = Some(decode_json(&req.prior_state)?).filter(|v| !v.is_null());
            let proposed_state = decode_json(&req.proposed_state)?;
            let config = decode_json(&req.config)?;
            self.provider
                .plan(&req.resource_type, prior_state, proposed_state, config)
                .await
        }
        .await;

        Ok(Response::new(match result {
            Ok(plan) => {
                info!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                protocol::PlanResponse {
                    planned_state: encode_json(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Plan failed");
                protocol::PlanResponse {
                    diagnostics: error_diagnostics(&e),
                    ..Default::default()
                }
            },
        }))
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type))]
    async fn create(
        &self,
        request: Request<protocol::CreateRequest>,
    ) -> Result<Response<protocol::CreateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode_json(&req.planned_state) {
            Ok(planned) => self.provider.create(&req.resource_type, planned).await,
            Err(e) => Err(e),
        };
        Ok(Response::new(match result {
            Ok(state) => {
                info!("Create completed");
                protocol::CreateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Create failed");
                protocol::CreateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            },
        }))
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type))]
    async fn read(
        &self,
        request: Request<protocol::ReadRequest>,
    ) -> Result<Response<protocol::ReadResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode_json(&req.current_state) {
            Ok(current) => self.provider.read(&req.resource_type, current).await,
            Err(e) => Err(e),
        };
        Ok(Response::new(match result {
            Ok(state) => {
                if state.is_null() {
                    info!("remote object is gone, dropping from state");
                }
                protocol::ReadResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Read failed");
                protocol::ReadResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            },
        }))
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type))]
    async fn update(
        &self,
        request: Request<protocol::UpdateRequest>,
    ) -> Result<Response<protocol::UpdateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result: Result<Value, ProviderError> = async {
            let prior = decode_json(&req.prior_state)?;
            let planned = decode_json(&req.planned_state)?;
            self.provider.update(&req.resource_type, prior, planned).await
        }
        .await;
        Ok(Response::new(match result {
            Ok(state) => {
                info!("Update completed");
                protocol::UpdateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Update failed");
                protocol::UpdateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            },
        }))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type))]
    async fn delete(
        &self,
        request: Request<protocol::DeleteRequest>,
    ) -> Result<Response<protocol::DeleteResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode_json(&req.current_state) {
            Ok(current) => self.provider.delete(&req.resource_type, current).await,
            Err(e) => Err(e),
        };
        let diagnostics = match result {
            Ok(()) => {
                info!("Delete completed");
                vec![]
            },
            Err(e) => {
                error!(error = %e, "Delete failed");
                error_diagnostics(&e)
            },
        };
        Ok(Response::new(protocol::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(resource_type))]
    async fn import_resource_state(
        &self,
        request: Request<protocol::ImportResourceStateRequest>,
    ) -> Result<Response<protocol::ImportResourceStateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        Ok(Response::new(
            match self.provider.import_resource(&req.resource_type, &req.id).await {
                Ok(imported) => {
                    info!(id = %req.id, count = imported.len(), "Import completed");
                    protocol::ImportResourceStateResponse {
                        imported: imported.into_iter().map(Into::into).collect(),
                        diagnostics: vec![],
                    }
                },
                Err(e) => {
                    error!(id = %req.id, error = %e, "Import failed");
                    protocol::ImportResourceStateResponse {
                        imported: vec![],
                        diagnostics: error_diagnostics(&e),
                    }
                },
            },
        ))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config", fields(data_source_type))]
    async fn validate_data_source_config(
        &self,
        request: Request<protocol::ValidateDataSourceConfigRequest>,
    ) -> Result<Response<protocol::ValidateDataSourceConfigResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let result = match decode_json(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_data_source_config(&req.data_source_type, config)
                    .await
            },
            Err(e) => Err(e),
        };
        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateDataSourceConfig", &req.data_source_type, &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateDataSourceConfig failed");
                error_diagnostics(&e)
            },
        };
        Ok(Response::new(protocol::ValidateDataSourceConfigResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.read_data_source", fields(data_source_type))]
    async fn read_data_source(
        &self,
        request: Request<protocol::ReadDataSourceRequest>,
    ) -> Result<Response<protocol::ReadDataSourceResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let result = match decode_json(&req.config) {
            Ok(config) => {
                self.provider
                    .read_data_source(&req.data_source_type, config)
                    .await
            },
            Err(e) => Err(e),
        };
        Ok(Response::new(match result {
            Ok(state) => protocol::ReadDataSourceResponse {
                state: encode_json(&state),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                protocol::ReadDataSourceResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            },
        }))
    }
}

/// Options for [`serve_with_options`].
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                    _ = sigint.recv() => info!("received SIGINT, shutting down"),
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "cannot install signal handlers, falling back to ctrl-c");
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            },
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!("received CTRL+C, shutting down");
    }
}

/// Serve `provider` on a free loopback port.
///
/// Prints the handshake `HEMMER_PROVIDER|<version>|<address>` on stdout and
/// runs until a shutdown signal arrives.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// [`serve`] with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options).await
}

/// Serve `provider` on a fixed address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "provider server starting");

    let provider = Arc::new(provider);
    let service = ProviderServer::new(ProviderGrpc::new(Arc::clone(&provider)));

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        wait_for_shutdown_signal().await;
        let _ = signalled_tx.send(());
    };

    let server = Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            shutdown,
        );
    tokio::pin!(server);

    // The drain timeout starts at the signal, not at startup.
    tokio::select! {
        result = &mut server => result?,
        _ = signalled_rx => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(timeout = ?options.shutdown_timeout, "shutdown timeout exceeded, forcing exit"),
            }
        },
    }

    if let Err(e) = provider.stop().await {
        warn!(error = %e, "provider stop returned an error");
    }
    info!("provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::service::Provider as _;
    use crate::schema::{Attribute, Schema};
    use crate::types::AttributeChange;
    use serde_json::json;

    struct EchoProvider;

    #[async_trait::async_trait]
    impl ProviderService for EchoProvider {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new().with_resource(
                "grafana_folder",
                Schema::v0()
                    .with_attribute("title", Attribute::required_string())
                    .with_attribute("id", Attribute::computed_string()),
            )
        }

        async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            if config.get("url").is_none() {
                return Ok(vec![Diagnostic::error("url is required").with_attribute("url")]);
            }
            Ok(vec![])
        }

        async fn plan(
            &self,
            _resource_type: &str,
            prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            let changes = match prior_state {
                None => vec![AttributeChange::added("title", proposed_state["title"].clone())],
                Some(_) => vec![],
            };
            Ok(PlanResult::with_changes(proposed_state, changes, false))
        }

        async fn create(&self, _t: &str, planned: Value) -> Result<Value, ProviderError> {
            Ok(planned)
        }

        async fn read(&self, _t: &str, _current: Value) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }

        async fn update(&self, _t: &str, _p: Value, planned: Value) -> Result<Value, ProviderError> {
            Ok(planned)
        }

        async fn delete(&self, resource_type: &str, _current: Value) -> Result<(), ProviderError> {
            Err(ProviderError::NotFound(format!("{} 1:abc", resource_type)))
        }
    }

    fn grpc() -> ProviderGrpc<EchoProvider> {
        ProviderGrpc::new(Arc::new(EchoProvider))
    }

    #[tokio::test]
    async fn test_get_schema() {
        let resp = grpc()
            .get_schema(Request::new(protocol::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();
        let folder = &resp.resources["grafana_folder"];
        let block = folder.block.as_ref().unwrap();
        let names: Vec<_> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title"]);
        assert_eq!(block.attributes[1].r#type, br#""string""#.to_vec());
    }

    #[tokio::test]
    async fn test_configure_diagnostics() {
        let resp = grpc()
            .configure(Request::new(protocol::ConfigureRequest {
                config: b"{}".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.diagnostics.len(), 1);
        assert_eq!(resp.diagnostics[0].attribute, "url");
        assert_eq!(
            resp.diagnostics[0].severity(),
            protocol::diagnostic::Severity::Error
        );
    }

    #[tokio::test]
    async fn test_plan_create_from_empty_prior() {
        let resp = grpc()
            .plan(Request::new(protocol::PlanRequest {
                resource_type: "grafana_folder".to_string(),
                prior_state: vec![],
                proposed_state: br#"{"title":"Alerts"}"#.to_vec(),
                config: br#"{"title":"Alerts"}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.diagnostics.is_empty());
        assert_eq!(resp.changes.len(), 1);
        assert_eq!(resp.changes[0].after, br#""Alerts""#.to_vec());
    }

    #[tokio::test]
    async fn test_invalid_json_becomes_diagnostic() {
        let resp = grpc()
            .create(Request::new(protocol::CreateRequest {
                resource_type: "grafana_folder".to_string(),
                planned_state: b"{not json".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.state.is_empty());
        assert_eq!(resp.diagnostics.len(), 1);
        assert!(resp.diagnostics[0].summary.contains("Serialization error"));
    }

    #[tokio::test]
    async fn test_errors_become_diagnostics() {
        let resp = grpc()
            .delete(Request::new(protocol::DeleteRequest {
                resource_type: "grafana_folder".to_string(),
                current_state: br#"{"id":"1:abc"}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.diagnostics.len(), 1);
        assert!(resp.diagnostics[0].summary.contains("not found"));
    }

    #[tokio::test]
    async fn test_read_gone_is_null_state() {
        let resp = grpc()
            .read(Request::new(protocol::ReadRequest {
                resource_type: "grafana_folder".to_string(),
                current_state: br#"{"id":"1:abc"}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.state, b"null".to_vec());
    }

    #[tokio::test]
    async fn test_default_import_is_unimplemented() {
        let resp = grpc()
            .import_resource_state(Request::new(protocol::ImportResourceStateRequest {
                resource_type: "grafana_folder".to_string(),
                id: "abc".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.imported.is_empty());
        assert!(resp.diagnostics[0].summary.contains("not supported"));
    }

    #[tokio::test]
    async fn test_default_stop_succeeds() {
        let resp = grpc()
            .stop(Request::new(protocol::StopRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.error.is_empty());
    }

    #[test]
    fn test_nested_block_modes_to_proto() {
        use crate::schema::{Block, NestedBlock};
        use protocol::nested_block::NestingMode;

        let block = Block::new()
            .with_block("rule", NestedBlock::list(Block::new()).with_min_items(1))
            .with_block("window", NestedBlock::single(Block::new()));
        let proto = block_to_proto(&block);
        let modes: Vec<_> = proto
            .block_types
            .iter()
            .map(|b| (b.type_name.as_str(), b.nesting_mode, b.min_items, b.max_items))
            .collect();
        assert_eq!(
            modes,
            vec![
                ("rule", NestingMode::List as i32, 1, 0),
                ("window", NestingMode::Single as i32, 0, 1),
            ]
        );
    }

    #[test]
    fn test_handshake_format() {
        let line = format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, "127.0.0.1:50051");
        assert_eq!(line, "HEMMER_PROVIDER|1|127.0.0.1:50051");
    }
}
