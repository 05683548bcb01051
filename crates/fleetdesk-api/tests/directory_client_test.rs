#![allow(clippy::unwrap_used)]
// Integration tests for `DirectoryClient` using wiremock.

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetdesk_api::{
    DEFAULT_CUSTOMER, DeviceAnnotation, DeviceCommandType, DirectoryClient, Error, ListParams,
    UserPatch,
};

const DEVICES: &str = "/admin/directory/v1/customer/my_customer/devices/chromeos";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DirectoryClient) {
    let server = MockServer::start().await;
    let client =
        DirectoryClient::from_reqwest(&server.uri(), DEFAULT_CUSTOMER, reqwest::Client::new())
            .unwrap();
    (server, client)
}

fn first_page() -> ListParams {
    ListParams {
        max_results: 2,
        ..ListParams::default()
    }
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_pagination() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("maxResults", "2"))
        .and(query_param("projection", "FULL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chromeosdevices": [
                { "deviceId": "d-1", "serialNumber": "5CD001", "status": "ACTIVE",
                  "orgUnitPath": "/Students/Grade 5", "annotatedAssetId": "CB-100" },
                { "deviceId": "d-2", "serialNumber": "5CD002", "status": "DISABLED" },
            ],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let page = client.list_devices(&first_page()).await.unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
    assert!(!page.is_last());
    assert_eq!(page.items[0].annotated_asset_id.as_deref(), Some("CB-100"));
    assert_eq!(page.items[1].status.as_deref(), Some("DISABLED"));
}

#[tokio::test]
async fn test_list_devices_follows_page_token() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chromeosdevices": [{ "deviceId": "d-3" }]
        })))
        .mount(&server)
        .await;

    let params = ListParams {
        page_token: Some("page-2".into()),
        ..first_page()
    };
    let page = client.list_devices(&params).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert!(page.is_last());
}

#[tokio::test]
async fn test_move_devices() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("{DEVICES}/moveDevicesToOu")))
        .and(query_param("orgUnitPath", "/Staff"))
        .and(body_json(json!({ "deviceIds": ["d-1", "d-2"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .move_devices(&["d-1".to_owned(), "d-2".to_owned()], "/Staff")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_issue_wipe_users_command() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("{DEVICES}/d-1:issueCommand")))
        .and(body_json(json!({ "commandType": "WIPE_USERS" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "commandId": "42" })))
        .mount(&server)
        .await;

    let resp = client
        .issue_command("d-1", DeviceCommandType::WipeUsers)
        .await
        .unwrap();
    assert_eq!(resp.command_id, "42");
}

#[tokio::test]
async fn test_annotate_device() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("{DEVICES}/d-1")))
        .and(body_json(json!({ "annotatedUser": "ada@school.example" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deviceId": "d-1",
            "annotatedUser": "ada@school.example"
        })))
        .mount(&server)
        .await;

    let annotation = DeviceAnnotation {
        annotated_user: Some("ada@school.example".into()),
        ..DeviceAnnotation::default()
    };
    let device = client.annotate_device("d-1", &annotation).await.unwrap();
    assert_eq!(device.annotated_user.as_deref(), Some("ada@school.example"));
}

#[tokio::test]
async fn test_list_users_folds_org_unit_into_query() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/admin/directory/v1/users"))
        .and(query_param("customer", "my_customer"))
        .and(query_param("query", "orgUnitPath='/Students'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{
                "id": "u-1",
                "primaryEmail": "ada.12345@school.example",
                "name": { "givenName": "Ada", "familyName": "Lovelace", "fullName": "Ada Lovelace" },
                "orgUnitPath": "/Students",
                "suspended": false
            }]
        })))
        .mount(&server)
        .await;

    let params = ListParams {
        max_results: 100,
        org_unit_path: Some("/Students".into()),
        ..ListParams::default()
    };
    let page = client.list_users(&params).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name.full_name.as_deref(), Some("Ada Lovelace"));
    assert!(page.total_count.is_none());
}

#[tokio::test]
async fn test_update_user_suspends() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/admin/directory/v1/users/ada@school.example"))
        .and(body_json(json!({ "suspended": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-1",
            "primaryEmail": "ada@school.example",
            "suspended": true
        })))
        .mount(&server)
        .await;

    let patch = UserPatch {
        suspended: Some(true),
        ..UserPatch::default()
    };
    let user = client.update_user("ada@school.example", &patch).await.unwrap();
    assert!(user.suspended);
}

#[tokio::test]
async fn test_list_org_units() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/admin/directory/v1/customer/my_customer/orgunits"))
        .and(query_param("type", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organizationUnits": [
                { "name": "Students", "orgUnitPath": "/Students", "parentOrgUnitPath": "/" },
                { "name": "Grade 5", "orgUnitPath": "/Students/Grade 5",
                  "parentOrgUnitPath": "/Students", "blockInheritance": true },
            ]
        })))
        .mount(&server)
        .await;

    let units = client.list_org_units().await.unwrap();
    assert_eq!(units.len(), 2);
    assert!(units[1].block_inheritance);
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "Invalid Credentials" }
        })))
        .mount(&server)
        .await;

    let err = client.list_devices(&first_page()).await.unwrap_err();
    match err {
        Error::Unauthorized { message } => assert_eq!(message, "Invalid Credentials"),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{DEVICES}/missing")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.get_device("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client.list_devices(&first_page()).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after_secs: 7 }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_api_error_carries_reason() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("{DEVICES}/moveDevicesToOu")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Invalid Input: orgUnitPath",
                "errors": [{ "reason": "invalid" }]
            }
        })))
        .mount(&server)
        .await;

    let err = client
        .move_devices(&["d-1".to_owned()], "/Nowhere")
        .await
        .unwrap_err();
    match &err {
        Error::Api { status, message, .. } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "Invalid Input: orgUnitPath");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(err.reason(), Some("invalid"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/admin/directory/v1/customer/my_customer/orgunits"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = client.list_org_units().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{DEVICES}/d-1")))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.get_device("d-1").await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "not json"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}
