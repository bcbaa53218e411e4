#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use spark_api::{AppState, AppStateInner, router};
use spark_auth::{ExternalUser, StaticIdentityProvider};
use spark_db::Database;
use spark_gateway::hub::Hub;

fn external(uid: &str, name: &str) -> ExternalUser {
    ExternalUser {
        uid: uid.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        display_name: name.into(),
    }
}

/// Router over an in-memory store with three known identities:
/// `tok-alice`, `tok-bob` and `tok-carol`.
pub fn setup() -> (Router, AppState) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let identity = StaticIdentityProvider::new()
        .with_user("tok-alice", external("uid-alice", "Alice"))
        .with_user("tok-bob", external("uid-bob", "Bob"))
        .with_user("tok-carol", external("uid-carol", "Carol"));
    let state = AppStateInner::new(db, Arc::new(identity), Hub::new());
    (router(state.clone()), state)
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Sync `token`'s identity and return the local user id.
pub async fn sync(app: &Router, token: &str) -> String {
    let (status, body) = call(app, "POST", "/v1/auth/sync", Some(token), None).await;
    assert!(status.is_success(), "sync failed: {} {}", status, body);
    body["user"]["id"].as_str().unwrap().to_string()
}
