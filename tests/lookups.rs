mod common;

use grafana_provider::client::SEARCH_PAGE_LIMIT;
use grafana_provider::ProviderError;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_organization_preferences_lookup() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/org/preferences"))
        .and(header("X-Grafana-Org-Id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "theme": "dark",
            "homeDashboardId": 0,
            "homeDashboardUID": "home",
            "timezone": "utc",
            "weekStart": "monday"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = tester
        .read_data_source("grafana_organization_preferences", json!({"org_id": "2"}))
        .await
        .unwrap();
    assert_eq!(
        state,
        json!({
            "id": "organization_preferences",
            "org_id": "2",
            "theme": "dark",
            "home_dashboard_id": 0,
            "home_dashboard_uid": "home",
            "timezone": "utc",
            "week_start": "monday"
        })
    );
}

#[tokio::test]
async fn test_data_source_lookup_by_name_omits_secrets() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/datasources/name/prometheus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "uid": "prom",
            "orgId": 1,
            "name": "prometheus",
            "type": "prometheus",
            "access": "proxy",
            "url": "http://prometheus:9090",
            "isDefault": true,
            "jsonData": {"httpMethod": "POST"},
            "secureJsonFields": {"basicAuthPassword": true}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = tester
        .read_data_source("grafana_data_source", json!({"name": "prometheus"}))
        .await
        .unwrap();
    assert_eq!(state["id"], "1:prom");
    assert_eq!(state["uid"], "prom");
    assert_eq!(state["url"], "http://prometheus:9090");
    assert_eq!(state["is_default"], true);
    assert!(state.get("secure_json_data_encoded").is_none());
    assert!(state.get("http_headers").is_none());
}

fn folder_hit(uid: &str, title: &str) -> Value {
    json!({"uid": uid, "title": title, "type": "dash-folder", "url": format!("/dashboards/f/{}", uid)})
}

async fn mount_search(server: &MockServer, query: &str, page: &str, hits: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("type", "dash-folder"))
        .and(query_param("query", query))
        .and(query_param("limit", SEARCH_PAGE_LIMIT.to_string()))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_folder_lookup_finds_nested_folder() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    mount_search(
        &mock_server,
        "Alerts",
        "1",
        vec![folder_hit("alerts-archive", "Alerts archive"), folder_hit("alerts", "Alerts")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/folders/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "uid": "alerts",
            "title": "Alerts",
            "url": "/dashboards/f/alerts/alerts",
            "parentUid": "team"
        })))
        .mount(&mock_server)
        .await;

    let state = tester
        .read_data_source("grafana_folder", json!({"title": "Alerts"}))
        .await
        .unwrap();
    assert_eq!(state["id"], "1:alerts");
    assert_eq!(state["parent_folder_uid"], "team");
    assert_eq!(
        state["url"],
        format!("{}/dashboards/f/alerts/alerts", mock_server.uri())
    );
}

#[tokio::test]
async fn test_folder_lookup_follows_search_pages() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    let first_page = (0..SEARCH_PAGE_LIMIT)
        .map(|i| folder_hit(&format!("team-{}", i), &format!("Team {}", i)))
        .collect();
    mount_search(&mock_server, "Team", "1", first_page).await;
    mount_search(&mock_server, "Team", "2", vec![folder_hit("team", "Team")]).await;
    Mock::given(method("GET"))
        .and(path("/api/folders/team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1001,
            "uid": "team",
            "title": "Team",
            "url": "/dashboards/f/team/team"
        })))
        .mount(&mock_server)
        .await;

    let state = tester
        .read_data_source("grafana_folder", json!({"title": "Team"}))
        .await
        .unwrap();
    assert_eq!(state["uid"], "team");
    assert_eq!(state["parent_folder_uid"], "");
}

#[tokio::test]
async fn test_folder_lookup_requires_exact_title() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    mount_search(&mock_server, "Alert", "1", vec![folder_hit("alerts", "Alerts")]).await;

    let err = tester
        .read_data_source("grafana_folder", json!({"title": "Alert"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}
