use grafana_provider::{init_logging, serve, GrafanaProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Grafana provider");
    serve(GrafanaProvider::new()).await
}
