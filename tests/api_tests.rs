//! API integration tests.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{test_app, test_app_with_token, test_app_with_user};

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).method(Method::GET);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    json_request(Method::POST, uri, token, body)
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method(method)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn register(app: &Router, email: &str) -> (String, Value) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            None,
            &json!({"email": email, "password": "password123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    (json["token"].as_str().unwrap().to_string(), json)
}

/// Health endpoint works without authentication.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_register_sets_cookie_and_returns_token() {
    let app = test_app().await;

    let response = app
        .oneshot(post_json(
            "/auth/register",
            None,
            &json!({"email": "alice@example.com", "password": "password123"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.contains("auth_token="));

    let json = body_json(response).await;
    assert!(json["token"].is_string());
    assert_eq!(json["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = test_app().await;
    register(&app, "alice@example.com").await;

    let response = app
        .oneshot(post_json(
            "/auth/register",
            None,
            &json!({"email": "alice@example.com", "password": "password123"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            None,
            &json!({"email": "not-an-email", "password": "password123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/auth/register",
            None,
            &json!({"email": "bob@example.com", "password": "short"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let app = test_app().await;
    register(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({"email": "alice@example.com", "password": "password123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["token"].is_string());

    let response = app
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({"email": "alice@example.com", "password": "wrong-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Protected endpoints reject requests without a token.
#[tokio::test]
async fn test_protected_requires_auth() {
    let app = test_app().await;

    for uri in ["/me", "/users", "/projects", "/chat/general/messages"] {
        let response = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let (app, token) = test_app_with_token().await;

    let response = app.oneshot(get("/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_list_users_excludes_caller() {
    let app = test_app().await;
    let (token, _) = register(&app, "alice@example.com").await;
    register(&app, "bob@example.com").await;

    let response = app.oneshot(get("/users", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let users = json["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "bob@example.com");
}

#[tokio::test]
async fn test_project_lifecycle() {
    let app = test_app().await;
    let (token, registered) = register(&app, "alice@example.com").await;

    // Create
    let response = app
        .clone()
        .oneshot(post_json(
            "/projects",
            Some(&token),
            &json!({"name": "apollo"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let project_id = json["project"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["project"]["name"], "apollo");
    assert_eq!(
        json["members"][0]["id"],
        registered["user"]["id"].as_str().unwrap()
    );

    // List
    let response = app
        .clone()
        .oneshot(get("/projects", Some(&token)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["projects"].as_array().unwrap().len(), 1);

    // Detail
    let response = app
        .clone()
        .oneshot(get(&format!("/projects/{project_id}"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Add a second member
    let (_, bob) = register(&app, "bob@example.com").await;
    let bob_id = bob["user"]["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/projects/{project_id}/users"),
            Some(&token),
            &json!({"users": [bob_id]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_project_detail_forbidden_for_non_member() {
    let app = test_app().await;
    let (alice_token, _) = register(&app, "alice@example.com").await;
    let (bob_token, _) = register(&app, "bob@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/projects",
            Some(&alice_token),
            &json!({"name": "apollo"}),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let project_id = json["project"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(get(&format!("/projects/{project_id}"), Some(&bob_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_add_unknown_user_is_rejected() {
    let app = test_app().await;
    let (token, _) = register(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/projects",
            Some(&token),
            &json!({"name": "apollo"}),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let project_id = json["project"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(json_request(
            Method::PUT,
            &format!("/projects/{project_id}/users"),
            Some(&token),
            &json!({"users": ["usr_doesnotexist"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_poll_roundtrip() {
    let (app, token) = test_app_with_token().await;

    // Empty room comes back empty, with the poller in the online list
    let response = app
        .clone()
        .oneshot(get("/chat/general/messages", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["messages"].as_array().unwrap().is_empty());
    assert_eq!(json["online_users"].as_array().unwrap().len(), 1);

    // Publish over HTTP
    let response = app
        .clone()
        .oneshot(post_json(
            "/chat/general/messages",
            Some(&token),
            &json!({"text": "hello world"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"]["text"], "hello world");
    assert_eq!(json["message"]["kind"], "user");
    let ts = json["message"]["timestamp"].as_str().unwrap().to_string();

    // Poll it back
    let response = app
        .clone()
        .oneshot(get("/chat/general/messages", Some(&token)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["messages"].as_array().unwrap().len(), 1);

    // A `since` at the message timestamp filters it out (strictly newer)
    let uri = format!(
        "/chat/general/messages?since={}",
        urlencoding::encode(&ts)
    );
    let response = app.oneshot(get(&uri, Some(&token))).await.unwrap();
    let json = body_json(response).await;
    assert!(json["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_empty_message_rejected() {
    let (app, token) = test_app_with_token().await;

    let response = app
        .oneshot(post_json(
            "/chat/general/messages",
            Some(&token),
            &json!({"text": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// A room named after a project is only open to that project's members.
#[tokio::test]
async fn test_project_room_requires_membership() {
    let app = test_app().await;
    let (alice_token, _) = register(&app, "alice@example.com").await;
    let (bob_token, _) = register(&app, "bob@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/projects",
            Some(&alice_token),
            &json!({"name": "apollo"}),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let project_id = json["project"]["id"].as_str().unwrap().to_string();

    let uri = format!("/chat/{project_id}/messages");
    let response = app
        .clone()
        .oneshot(get(&uri, Some(&bob_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.oneshot(get(&uri, Some(&alice_token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_assistant_health_reports_failure() {
    let (app, token, _) = test_app_with_user("alice@example.com").await;

    let response = app
        .oneshot(get("/assistant/health", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_assistant_generate_maps_unavailable() {
    let (app, token) = test_app_with_token().await;

    let response = app
        .oneshot(get("/assistant/generate?prompt=hello", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
