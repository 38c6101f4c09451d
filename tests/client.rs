use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use grafana_provider::client::{Auth, ClientSettings, GrafanaClient, ORG_ID_HEADER};
use grafana_provider::GrafanaError;
use serde_json::json;
use tracing::instrument::WithSubscriber;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, retries: u32) -> GrafanaClient {
    let mut settings = ClientSettings::new(server.uri(), Auth::parse("admin:admin"));
    settings.retries = retries;
    settings.retry_wait = Duration::ZERO;
    settings.http_headers = vec![("X-Team".to_string(), "platform".to_string())];
    GrafanaClient::new(settings).unwrap()
}

#[tokio::test]
async fn test_org_header_and_custom_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/folders/alerts"))
        .and(header(ORG_ID_HEADER, "3"))
        .and(header("X-Team", "platform"))
        .and(header("authorization", "Basic YWRtaW46YWRtaW4="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "uid": "alerts",
            "title": "Alerts",
            "url": "/dashboards/f/alerts/alerts",
            "version": 1
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let folder = client(&mock_server, 0)
        .with_org_id(3)
        .folder_by_uid("alerts")
        .await
        .unwrap();
    assert_eq!(folder.title, "Alerts");
}

#[tokio::test]
async fn test_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Team"})))
        .mount(&mock_server)
        .await;

    let org = client(&mock_server, 1).org(2).await.unwrap();
    assert_eq!(org.name, "Team");
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_retry_logged_inside_endpoint_span() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Team"})))
        .mount(&mock_server)
        .await;

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();

    client(&mock_server, 1)
        .org(2)
        .with_subscriber(subscriber)
        .await
        .unwrap();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let retry = output
        .lines()
        .find(|line| line.contains("retrying Grafana request"))
        .unwrap_or_else(|| panic!("no retry line in:\n{output}"));
    assert!(retry.contains("DEBUG"), "{retry}");
    assert!(retry.contains("org{id=2}"), "{retry}");
    assert!(retry.contains("path=api/orgs/2"), "{retry}");
    assert!(retry.contains("status=503"), "{retry}");
}

#[tokio::test]
async fn test_gives_up_after_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
        .expect(3)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, 2).org(2).await.unwrap_err();
    assert!(matches!(err, GrafanaError::Api { status: 429, ref message } if message == "slow down"));
}

#[tokio::test]
async fn test_not_found_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/datasources/uid/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Data source not found"})),
        )
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, 3)
        .data_source_by_uid("missing")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "API error (404): Data source not found");
}

#[tokio::test]
async fn test_delete_folder_forces_rule_deletion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/folders/alerts"))
        .and(query_param("forceDeleteRules", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Folder deleted"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    client(&mock_server, 0)
        .delete_folder("alerts", true)
        .await
        .unwrap();
}
