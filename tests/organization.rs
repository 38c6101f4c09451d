mod common;

use grafana_provider::testing::assert_plan_no_changes;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TYPE: &str = "grafana_organization";

fn admin() -> Value {
    json!({"orgId": 2, "userId": 1, "login": "admin", "email": "admin@localhost", "role": "Admin"})
}

fn john(role: &str) -> Value {
    json!({"orgId": 2, "userId": 5, "login": "john", "email": "john@example.com", "role": role})
}

#[tokio::test]
async fn test_organization_create_adds_members() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api/orgs"))
        .and(body_json(json!({"name": "Platform"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orgId": 2,
            "message": "Organization created"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([admin()])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/orgs/2/users"))
        .and(body_json(json!({"loginOrEmail": "john@example.com", "role": "Viewer"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "User added"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([admin(), john("Viewer")])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Platform"})))
        .mount(&mock_server)
        .await;

    let config = json!({"name": "Platform", "viewers": ["john@example.com"]});
    let state = tester.apply(TYPE, None, config.clone()).await.unwrap();
    assert_eq!(state["id"], "2");
    assert_eq!(state["org_id"], 2);
    assert_eq!(state["admin_user"], "admin");
    assert_eq!(state["viewers"], json!(["john@example.com"]));
    assert!(state["admins"].is_null());

    let plan = tester.refresh_plan(TYPE, state, config).await.unwrap();
    assert_plan_no_changes(&plan);
}

#[tokio::test]
async fn test_organization_update_changes_roles() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/orgs/2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([admin(), john("Viewer")])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/orgs/2/users/5"))
        .and(body_json(json!({"role": "Editor"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Role updated"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([admin(), john("Editor")])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Platform"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let prior = json!({
        "id": "2",
        "org_id": 2,
        "name": "Platform",
        "admin_user": "admin",
        "viewers": ["john@example.com"]
    });
    let state = tester
        .apply(TYPE, Some(prior), json!({"name": "Platform", "editors": ["john@example.com"]}))
        .await
        .unwrap();
    assert_eq!(state["editors"], json!(["john@example.com"]));
    assert!(state["viewers"].is_null());
}

#[tokio::test]
async fn test_organization_import_reports_members_by_email() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Platform"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([admin(), john("Admin")])))
        .mount(&mock_server)
        .await;

    let imported = tester.import_resource(TYPE, "2").await.unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].state["name"], "Platform");
    assert_eq!(imported[0].state["admins"], json!(["john@example.com"]));
}

#[tokio::test]
async fn test_organization_delete() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("DELETE"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Organization deleted"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    tester.delete(TYPE, json!({"id": "2", "name": "Platform"})).await.unwrap();
}

#[tokio::test]
async fn test_admin_user_listed_as_member_has_no_drift() {
    let mock_server = MockServer::start().await;
    let tester = common::tester(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/orgs/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Platform"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orgs/2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([admin(), john("Editor")])))
        .mount(&mock_server)
        .await;

    let config = json!({
        "name": "Platform",
        "admins": ["admin"],
        "editors": ["john@example.com"]
    });
    let mut state = config.clone();
    state["id"] = json!("2");
    state["org_id"] = json!(2);
    state["admin_user"] = json!("admin");

    let refreshed = tester.read(TYPE, state.clone()).await.unwrap();
    assert_eq!(refreshed["admins"], json!(["admin"]));

    let plan = tester.refresh_plan(TYPE, state, config).await.unwrap();
    assert_plan_no_changes(&plan);
}
