#![allow(dead_code)]

use grafana_provider::testing::ProviderTester;
use wiremock::MockServer;

/// A provider configured against `server`, with retries disabled.
pub async fn tester(server: &MockServer) -> ProviderTester {
    ProviderTester::configured(&server.uri())
        .await
        .expect("provider should accept the mock server URL")
}
