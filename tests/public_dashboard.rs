mod common;

use grafana_provider::testing::{assert_plan_no_changes, assert_plan_replaces};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TYPE: &str = "grafana_dashboard_public";
const COLLECTION: &str = "/api/dashboards/uid/dash/public-dashboards";

fn remote(is_enabled: bool) -> Value {
    json!({
        "uid": "pub",
        "dashboardUid": "dash",
        "accessToken": "e99e4275da6f410d83760eefa934d8d2",
        "timeSelectionEnabled": true,
        "isEnabled": is_enabled,
        "annotationsEnabled": false,
        "share": "public"
    })
}

#[tokio::test]
async fn test_public_dashboard_lifecycle() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(COLLECTION))
        .and(header("X-Grafana-Org-Id", "3"))
        .and(body_json(json!({
            "timeSelectionEnabled": true,
            "isEnabled": true,
            "annotationsEnabled": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote(true)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(header("X-Grafana-Org-Id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote(true)))
        .mount(&mock_server)
        .await;

    let config = json!({
        "org_id": "3",
        "dashboard_uid": "dash",
        "time_selection_enabled": true,
        "is_enabled": true
    });
    let state = tester.apply(TYPE, None, config.clone()).await.unwrap();
    assert_eq!(state["id"], "3:dash:pub");
    assert_eq!(state["access_token"], "e99e4275da6f410d83760eefa934d8d2");
    assert_eq!(state["share"], "public");

    let plan = tester.refresh_plan(TYPE, state.clone(), config).await.unwrap();
    assert_plan_no_changes(&plan);

    Mock::given(method("DELETE"))
        .and(path(format!("{}/pub", COLLECTION)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    tester.delete(TYPE, state).await.unwrap();
}

#[tokio::test]
async fn test_public_dashboard_pause() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/pub", COLLECTION)))
        .and(header("X-Grafana-Org-Id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote(false)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote(false)))
        .mount(&mock_server)
        .await;

    let prior = json!({
        "id": "3:dash:pub",
        "org_id": "3",
        "uid": "pub",
        "dashboard_uid": "dash",
        "access_token": "e99e4275da6f410d83760eefa934d8d2",
        "time_selection_enabled": true,
        "is_enabled": true,
        "annotations_enabled": false,
        "share": "public"
    });
    let config = json!({
        "org_id": "3",
        "dashboard_uid": "dash",
        "time_selection_enabled": true,
        "is_enabled": false
    });
    let state = tester.apply(TYPE, Some(prior.clone()), config).await.unwrap();
    assert_eq!(state["is_enabled"], false);
    assert_eq!(state["id"], "3:dash:pub");

    let plan = tester
        .plan_update(TYPE, prior, json!({"org_id": "3", "dashboard_uid": "other"}))
        .await
        .unwrap();
    assert_plan_replaces(&plan);
}

#[tokio::test]
async fn test_unpublished_dashboard_reads_as_gone() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Public dashboard not found"
        })))
        .mount(&mock_server)
        .await;

    let state = tester.read(TYPE, json!({"id": "3:dash:pub"})).await.unwrap();
    assert!(state.is_null());
}
