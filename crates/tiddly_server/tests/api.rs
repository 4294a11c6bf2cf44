//! HTTP surface tests driven through the router with `oneshot`.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::Extension,
    http::{HeaderMap, HeaderName, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tiddly_core::{MemoryStore, Wiki};
use tiddly_server::{
    auth::AdminGate,
    config::DEFAULT_MAX_BODY_BYTES,
    handlers::{status::StatusState, status_routes, tiddler_routes, tiddlers::TiddlerState},
};
use tower::ServiceExt;

const IDENTITY: &str = "x-goog-authenticated-user-email";
const ADMIN: &str = "accounts.google.com:admin@example.com";

struct TestApp {
    router: Router,
    dir: tempfile::TempDir,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

fn app_with_admins(admins: Vec<String>) -> TestApp {
    app_with(admins, DEFAULT_MAX_BODY_BYTES)
}

fn app_with(admins: Vec<String>, max_body_bytes: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("index.html");
    std::fs::write(&index_path, "<html>wiki</html>").unwrap();

    let wiki = Wiki::new(Arc::new(MemoryStore::new()));
    let router = Router::new()
        .merge(status_routes(StatusState {
            index_path: Arc::new(index_path),
        }))
        .merge(tiddler_routes(TiddlerState {
            wiki,
            max_body_bytes,
        }))
        .layer(Extension(AdminGate::new(
            HeaderName::from_static(IDENTITY),
            admins,
        )));
    TestApp { router, dir }
}

fn app() -> TestApp {
    app_with_admins(Vec::new())
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<&str>) -> Reply {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(IDENTITY, ADMIN)
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        self.send(request).await
    }

    async fn put(&self, title: &str, body: &str) -> Reply {
        self.call(Method::PUT, &format!("/recipes/all/tiddlers/{title}"), Some(body))
            .await
    }

    async fn get(&self, uri: &str) -> Reply {
        self.call(Method::GET, uri, None).await
    }
}

#[tokio::test]
async fn put_then_get_returns_fields_and_text() {
    let app = app();

    let put = app.put("Alpha", r#"{"title":"Alpha","a":1,"text":"x"}"#).await;
    assert_eq!(put.status, StatusCode::OK);
    let etag = put.headers[header::ETAG].to_str().unwrap();
    assert!(etag.starts_with("\"bag/Alpha/1:"), "{etag}");
    assert!(etag.ends_with('"'));
    let hash = &etag["\"bag/Alpha/1:".len()..etag.len() - 1];
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let got = app.get("/recipes/all/tiddlers/Alpha").await;
    assert_eq!(got.status, StatusCode::OK);
    let body = got.json();
    assert_eq!(body["a"], json!(1));
    assert_eq!(body["text"], json!("x"));
    assert_eq!(body["bag"], json!("bag"));
    assert_eq!(body["revision"], json!(1));

    let short = app.get("/tiddlers/Alpha").await;
    assert_eq!(short.json(), body);
}

#[tokio::test]
async fn revisions_advance_across_routes() {
    let app = app();
    app.put("T", r#"{"text":"a"}"#).await;
    let second = app
        .call(Method::PUT, "/tiddlers/T", Some(r#"{"text":"b"}"#))
        .await;
    assert!(
        second.headers[header::ETAG]
            .to_str()
            .unwrap()
            .starts_with("\"bag/T/2:")
    );
    assert_eq!(app.get("/tiddlers/T").await.json()["revision"], json!(2));
}

#[tokio::test]
async fn listing_inlines_macros_only() {
    let app = app();
    app.put(
        "Macros",
        r#"{"title":"Macros","tags":["$:/tags/Macro"],"text":"\\define x() y"}"#,
    )
    .await;
    app.put("Plain", r#"{"title":"Plain","text":"body"}"#).await;

    let list = app.get("/recipes/all/tiddlers.json").await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(
        list.headers[header::CONTENT_TYPE].to_str().unwrap(),
        "application/json"
    );
    let entries = list.json();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["title"], json!("Macros"));
    assert_eq!(entries[0]["text"], json!("\\define x() y"));
    assert_eq!(entries[1]["title"], json!("Plain"));
    assert!(entries[1].get("text").is_none());

    assert_eq!(app.get("/tiddlers.json").await.json(), list.json());
}

#[tokio::test]
async fn delete_hides_tiddler_from_get_and_listing() {
    let app = app();
    app.put("Gone", r#"{"title":"Gone","text":"x"}"#).await;

    let deleted = app
        .call(Method::DELETE, "/bags/bag/tiddlers/Gone", None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert!(deleted.body.is_empty());

    assert_eq!(app.get("/tiddlers/Gone").await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/tiddlers.json").await.json(), json!([]));

    // Writing again continues the revision sequence past the tombstone.
    let again = app.put("Gone", r#"{"text":"back"}"#).await;
    assert!(
        again.headers[header::ETAG]
            .to_str()
            .unwrap()
            .starts_with("\"bag/Gone/3:")
    );
}

#[tokio::test]
async fn unknown_tiddler_is_not_found() {
    let app = app();
    let reply = app.get("/tiddlers/Nobody").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.json()["error"].as_str().unwrap().contains("Nobody"));

    let delete = app.call(Method::DELETE, "/tiddlers/Nobody", None).await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
    let app = app();
    for body in ["not json", "[1,2]", r#"{"tags":"x"}"#] {
        let reply = app.put("Bad", body).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{body}");
    }
    assert_eq!(app.get("/tiddlers/Bad").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_methods_are_rejected() {
    let app = app();
    let post = app
        .call(Method::POST, "/recipes/all/tiddlers/T", Some("{}"))
        .await;
    assert_eq!(post.status, StatusCode::METHOD_NOT_ALLOWED);

    let get_bag = app.get("/bags/bag/tiddlers/T").await;
    assert_eq!(get_bag.status, StatusCode::METHOD_NOT_ALLOWED);

    let put_list = app.call(Method::PUT, "/tiddlers.json", Some("{}")).await;
    assert_eq!(put_list.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn titles_with_slashes_round_trip() {
    let app = app();
    let put = app
        .put("%24%3A%2FStoryList", r#"{"list":"Alpha"}"#)
        .await;
    assert_eq!(put.status, StatusCode::OK);
    assert!(
        put.headers[header::ETAG]
            .to_str()
            .unwrap()
            .starts_with("\"bag/%24%3A%2FStoryList/1:")
    );

    let encoded = app.get("/tiddlers/%24%3A%2FStoryList").await;
    assert_eq!(encoded.json()["list"], json!("Alpha"));

    let raw = app.get("/tiddlers/$:/StoryList").await;
    assert_eq!(raw.status, StatusCode::OK);
    assert_eq!(raw.json(), encoded.json());
}

#[tokio::test]
async fn if_match_guards_against_stale_writes() {
    let app = app();
    let first = app.put("T", r#"{"text":"a"}"#).await;
    let first_etag = first.headers[header::ETAG].to_str().unwrap().to_string();

    let conditional = |etag: String| {
        Request::builder()
            .method(Method::PUT)
            .uri("/tiddlers/T")
            .header(IDENTITY, ADMIN)
            .header(header::IF_MATCH, etag)
            .body(Body::from(r#"{"text":"b"}"#))
            .unwrap()
    };

    let ok = app.send(conditional(first_etag.clone())).await;
    assert_eq!(ok.status, StatusCode::OK);

    let stale = app.send(conditional(first_etag)).await;
    assert_eq!(stale.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(app.get("/tiddlers/T").await.json()["revision"], json!(2));

    let garbage = app.send(conditional("\"nonsense\"".to_string())).await;
    assert_eq!(garbage.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requests_without_identity_are_forbidden() {
    let app = app();
    let request = Request::builder()
        .uri("/tiddlers.json")
        .body(Body::empty())
        .unwrap();
    let reply = app.send(request).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.text(), "permission denied");
}

#[tokio::test]
async fn non_admin_identity_is_forbidden() {
    let app = app_with_admins(vec!["admin@example.com".to_string()]);
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/tiddlers/T")
        .header(IDENTITY, "accounts.google.com:mallory@example.com")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::FORBIDDEN);

    assert_eq!(app.put("T", "{}").await.status, StatusCode::OK);
}

#[tokio::test]
async fn status_names_the_caller() {
    let app = app();
    let status = app.get("/status").await;
    assert_eq!(
        status.json(),
        json!({"username": "admin@example.com", "space": {"recipe": "all"}})
    );

    let anonymous = Request::builder()
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(anonymous).await.json()["username"], json!("GUEST"));

    let auth = app.get("/auth").await;
    assert!(auth.text().contains("You are logged in as admin@example.com."));
}

#[tokio::test]
async fn index_and_health() {
    let app = app();
    let index = app.get("/").await;
    assert_eq!(index.status, StatusCode::OK);
    assert_eq!(index.text(), "<html>wiki</html>");

    let health = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(health).await.text(), "OK");
}

#[tokio::test]
async fn missing_index_is_not_found() {
    let app = app();
    std::fs::remove_file(app.dir.path().join("index.html")).unwrap();
    assert_eq!(app.get("/").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn large_tiddlers_fit_under_the_configured_limit() {
    let app = app();
    let text = "x".repeat(5 * 1024 * 1024);
    let body = json!({ "title": "Big", "text": text }).to_string();
    assert_eq!(app.put("Big", &body).await.status, StatusCode::OK);

    let got = app.get("/tiddlers/Big").await;
    assert_eq!(got.json()["text"].as_str().map(str::len), Some(text.len()));
}

#[tokio::test]
async fn bodies_over_the_limit_are_refused() {
    let app = app_with(Vec::new(), 1024);
    let body = json!({ "text": "x".repeat(2048) }).to_string();
    let reply = app.put("Big", &body).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.get("/tiddlers/Big").await.status, StatusCode::NOT_FOUND);
}
