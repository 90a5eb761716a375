use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::app::{AppBackend, AppLocal};
use crate::contacts::Sheet;
use crate::web;

use super::app::{create_app, new_contact};

fn create_router() -> (Router, Arc<AppLocal>, tempfile::TempDir) {
    let (app, tmp) = create_app();
    let app = Arc::new(app);
    (web::router(app.clone()), app, tmp)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn location(headers: &header::HeaderMap) -> String {
    headers[header::LOCATION].to_str().unwrap().to_string()
}

// --- JSON API ---

#[tokio::test(flavor = "multi_thread")]
async fn api_create_routes_duplicates() {
    let (router, _app, _tmp) = create_router();

    let (status, _, body) = send(
        &router,
        post_json("/api/contacts/create", json!({"name": "Alice", "number": "555 123 4567"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["sheet"], "primary");
    assert_eq!(body["contact"]["id"], 0);

    let (status, _, body) = send(
        &router,
        post_json("/api/contacts/create", json!({"name": "Alice 2", "number": "555-123-4567"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["sheet"], "repeating");

    let (status, _, body) = send(&router, get("/api/contacts/total")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, json!({"primary": 1, "repeating": 1}));
}

#[tokio::test(flavor = "multi_thread")]
async fn api_create_rejects_bad_input() {
    let (router, app, _tmp) = create_router();

    let (status, _, body) = send(
        &router,
        post_json("/api/contacts/create", json!({"name": "", "number": "555 123 4567"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("error"));

    let (status, _, _) = send(
        &router,
        post_json("/api/contacts/create", json!({"name": "Bob", "number": "call me"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.total(Sheet::Primary).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn api_search_with_flattened_query() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("charlie", "555 000 0003")).unwrap();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Bob", "555 999 1112")).unwrap();

    let (status, _, body) = send(
        &router,
        post_json("/api/contacts/search", json!({"keyword": "555 000", "sorted": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    let names = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Alice", "charlie"]);

    let (_, _, body) = send(
        &router,
        post_json("/api/contacts/search", json!({"sheet": "repeating"})),
    )
    .await;
    assert_eq!(body, "[]");
}

#[tokio::test(flavor = "multi_thread")]
async fn api_update_and_delete_status_codes() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Bob", "555 000 0002")).unwrap();

    let (status, _, body) = send(
        &router,
        post_json("/api/contacts/update", json!({"id": 1, "name": "Robert"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["name"], "Robert");

    let (status, _, _) = send(
        &router,
        post_json("/api/contacts/update", json!({"id": 1, "number": "5550000001"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = send(
        &router,
        post_json("/api/contacts/update", json!({"id": 9, "name": "Nobody"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&router, post_json("/api/contacts/delete", json!({"id": 0}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&router, post_json("/api/contacts/delete", json!({"id": 0}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &router,
        post_json("/api/contacts/delete", json!({"id": 0, "sheet": "repeating"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn api_semantic_search_disabled() {
    let (router, _app, _tmp) = create_router();

    let (status, _, body) = send(
        &router,
        post_json("/api/contacts/semantic_search", json!({"text": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("disabled"));

    let (status, _, _) = send(
        &router,
        post_json(
            "/api/contacts/semantic_search",
            json!({"text": "alice", "threshold": 3.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- export ---

#[tokio::test(flavor = "multi_thread")]
async fn export_downloads_csv() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Alice 2", "555 000 0001")).unwrap();

    let (status, headers, body) = send(&router, get("/export/repeating")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"repeating_contacts.csv\""
    );

    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("id,name,number,last_updated"));
    assert!(lines.next().unwrap().starts_with("0,Alice 2,555 000 0001,"));
    assert_eq!(lines.next(), None);

    let (status, _, _) = send(&router, get("/export/nonsense")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- html form UI ---

#[tokio::test(flavor = "multi_thread")]
async fn index_page_lists_both_sheets() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("<Alice>", "555 000 0001")).unwrap();
    app.add(new_contact("Alice again", "555 000 0001")).unwrap();

    let (status, headers, body) = send(&router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert!(body.contains("&lt;Alice&gt;"));
    assert!(!body.contains("<Alice>"));
    assert!(body.contains("Repeating Contacts (1)"));
    assert!(body.contains("Alice again"));
}

#[tokio::test(flavor = "multi_thread")]
async fn index_search_filters_both_sheets() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Alice again", "555 000 0001")).unwrap();
    app.add(new_contact("Bob", "555 999 1112")).unwrap();

    let (_, _, body) = send(&router, get("/?q=bob")).await;
    assert!(body.contains("<h2>Contacts (1)</h2>"));
    assert!(body.contains("Repeating Contacts (0)"));
    assert!(!body.contains("Alice again"));

    let (_, _, body) = send(&router, get("/?q=again")).await;
    assert!(body.contains("<h2>Contacts (0)</h2>"));
    assert!(body.contains("Repeating Contacts (1)"));
    assert!(body.contains("Alice again"));
}

#[tokio::test(flavor = "multi_thread")]
async fn index_page_lookup_shows_edit_form() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();

    let (_, _, body) = send(&router, get("/?lookup=555-000-0001")).await;
    assert!(body.contains("action=\"/contacts/0/update\""));
    assert!(body.contains("action=\"/contacts/0/delete\""));

    let (_, _, body) = send(&router, get("/?lookup=999")).await;
    assert!(body.contains("No contact found with this number."));
}

#[tokio::test(flavor = "multi_thread")]
async fn form_add_redirects_with_message() {
    let (router, app, _tmp) = create_router();

    let (status, headers, _) = send(&router, post_form("/contacts", "name=Alice&number=555+000+0001")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location(&headers),
        "/?msg=Contact+added+successfully%21"
    );

    let (_, headers, _) = send(&router, post_form("/contacts", "name=Twin&number=5550000001")).await;
    assert!(location(&headers).contains("repeating+sheet"));

    let (status, headers, _) = send(&router, post_form("/contacts", "name=&number=123")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location(&headers).starts_with("/?error=Please+enter+both+name+and+number."));

    assert_eq!(app.total(Sheet::Primary).unwrap(), 1);
    assert_eq!(app.total(Sheet::Repeating).unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn form_update_and_delete() {
    let (router, app, _tmp) = create_router();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Bob", "555 000 0002")).unwrap();

    let (_, headers, _) = send(
        &router,
        post_form("/contacts/0/update", "name=Alice+Smith&number=555+000+0001"),
    )
    .await;
    assert!(location(&headers).starts_with("/?msg="));
    assert_eq!(app.get(Sheet::Primary, 0).unwrap().name, "Alice Smith");

    let (_, headers, _) = send(
        &router,
        post_form("/contacts/1/update", "name=Bob&number=555+000+0001"),
    )
    .await;
    assert!(location(&headers).starts_with("/?error="));

    let (_, headers, _) = send(&router, post_form("/contacts/1/delete", "")).await;
    assert_eq!(location(&headers), "/?msg=Contact+deleted+successfully%21");

    let (_, headers, _) = send(&router, post_form("/contacts/1/delete", "")).await;
    assert_eq!(location(&headers), "/?error=contact+not+found");
}
