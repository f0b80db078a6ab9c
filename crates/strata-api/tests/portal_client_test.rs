#![allow(clippy::unwrap_used)]
// Integration tests for `PortalClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strata_api::{Error, NotificationPatch, PageQuery, PortalClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, PortalClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = PortalClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn api_path(suffix: &str) -> String {
    format!("/api/v1/{suffix}")
}

// ── Notification listing ────────────────────────────────────────────

#[tokio::test]
async fn test_list_notifications() {
    let (server, client) = setup().await;

    let body = json!({
        "items": [{
            "id": "n-1",
            "title": "Levy notice issued",
            "body": "Quarterly levies are due",
            "category": "payment",
            "is_read": false,
            "created_at": "2026-03-01T09:00:00Z",
            "updated_at": "2026-03-01T09:00:00Z"
        }],
        "total_count": 37
    });

    Mock::given(method("GET"))
        .and(path(api_path("notifications")))
        .and(query_param("page", "1"))
        .and(query_param("page_size", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let page = client
        .list_notifications(&PageQuery::new(1, 10))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total_count, 37);
    assert_eq!(page.items[0].id, "n-1");
    assert_eq!(page.items[0].category, "payment");
    assert!(!page.items[0].is_read);
}

#[tokio::test]
async fn test_list_notifications_with_filter() {
    let (server, client) = setup().await;

    let body = json!({ "items": [], "total_count": 0 });

    Mock::given(method("GET"))
        .and(path(api_path("notifications")))
        .and(query_param("category", "maintenance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let mut query = PageQuery::new(1, 10);
    query
        .filters
        .push(("category".to_owned(), "maintenance".to_owned()));

    let page = client.list_notifications(&query).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 0);
}

// ── Notification writes ─────────────────────────────────────────────

#[tokio::test]
async fn test_update_notification_mark_read() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path(api_path("notifications/n-1")))
        .and(body_json(json!({ "is_read": true })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let patch = NotificationPatch {
        is_read: Some(true),
        ..NotificationPatch::default()
    };
    client.update_notification("n-1", &patch).await.unwrap();
}

#[tokio::test]
async fn test_update_notification_conflict() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path(api_path("notifications/n-1")))
        .respond_with(ResponseTemplate::new(409).set_body_string("entity changed"))
        .mount(&server)
        .await;

    let patch = NotificationPatch {
        deleted: Some(true),
        ..NotificationPatch::default()
    };
    let result = client.update_notification("n-1", &patch).await;

    assert!(
        matches!(result, Err(Error::Conflict { .. })),
        "expected Conflict error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_restore_notification() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(api_path("notifications/n-1/restore")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client.restore_notification("n-1").await.unwrap();
}

// ── Administrators ──────────────────────────────────────────────────

#[tokio::test]
async fn test_list_administrators() {
    let (server, client) = setup().await;

    let body = json!({
        "items": [
            {
                "id": "a-1",
                "name": "Harbour Strata Management",
                "email": "office@harbourstrata.example",
                "suburb": "Kirribilli",
                "building_count": 14,
                "updated_at": "2026-02-20T08:00:00Z"
            },
            {
                "id": "a-2",
                "name": "Southbank Body Corporate",
                "updated_at": "2026-02-21T08:00:00Z"
            }
        ],
        "total_count": 2
    });

    Mock::given(method("GET"))
        .and(path(api_path("administrators")))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let page = client
        .list_administrators(&PageQuery::new(1, 25))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].name, "Harbour Strata Management");
    assert_eq!(page.items[0].building_count, Some(14));
    assert!(page.items[1].email.is_none());
}

// ── Selection persistence ───────────────────────────────────────────

#[tokio::test]
async fn test_get_active_administrator() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("me/active-administrator")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "administrator_id": "a-2" })),
        )
        .mount(&server)
        .await;

    let active = client.get_active_administrator().await.unwrap();
    assert_eq!(active.as_deref(), Some("a-2"));
}

#[tokio::test]
async fn test_get_active_administrator_unset() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("me/active-administrator")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "administrator_id": null })),
        )
        .mount(&server)
        .await;

    let active = client.get_active_administrator().await.unwrap();
    assert!(active.is_none());
}

#[tokio::test]
async fn test_set_active_administrator() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(api_path("me/active-administrator")))
        .and(body_json(json!({ "administrator_id": "a-1" })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client.set_active_administrator(Some("a-1")).await.unwrap();
}

#[tokio::test]
async fn test_clear_active_administrator() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(api_path("me/active-administrator")))
        .and(body_json(json!({ "administrator_id": null })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client.set_active_administrator(None).await.unwrap();
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_session_expired() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.list_notifications(&PageQuery::new(1, 10)).await;

    assert!(
        matches!(result, Err(Error::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
}

#[tokio::test]
async fn test_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("notifications/n-404")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client.get_notification("n-404").await;

    assert!(
        matches!(result, Err(ref e) if e.is_not_found()),
        "expected NotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = client.list_administrators(&PageQuery::new(1, 25)).await;

    match result {
        Err(ref e) => assert!(e.is_transient(), "expected transient error, got: {e:?}"),
        Ok(_) => panic!("expected error"),
    }
}
