//! Grafana provider for Hemmer.
//!
//! Exposes Grafana and Grafana Cloud objects as declarative resources over
//! the Hemmer provider protocol. The host plans and stores state; this crate
//! translates between resource state and Grafana's HTTP API.
//!
//! # Resources
//!
//! | Type | Grafana object | ID |
//! |------|----------------|----|
//! | `grafana_data_source` | data source | `orgID:uid` |
//! | `grafana_folder` | folder | `orgID:uid` |
//! | `grafana_rule_group` | alert rule group | `orgID:folderUID;name` |
//! | `grafana_dashboard_public` | public dashboard | `orgID:dashboardUID:uid` |
//! | `grafana_organization` | organization and members | `orgID` |
//! | `grafana_slo` | Grafana Cloud SLO | `uuid` |
//!
//! Lookups: `grafana_data_source`, `grafana_folder` and
//! `grafana_organization_preferences`.
//!
//! # Handshake
//!
//! [`serve`] binds a loopback port and prints
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! on stdout so the host can connect. Logs go to stderr.
//!
//! # Example
//!
//! ```no_run
//! use grafana_provider::{init_logging, serve, GrafanaProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(GrafanaProvider::new()).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod lookups;
pub mod plan;
pub mod protocol;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
mod state;
pub mod testing;
pub mod types;
pub mod validation;

pub use client::{GrafanaClient, GrafanaError};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::GrafanaProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_on, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::validate;
