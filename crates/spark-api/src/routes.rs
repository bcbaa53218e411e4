use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{conversations, profiles, realtime, users};

pub fn router(state: AppState) -> Router {
    // The chat socket authenticates through the access gate, not the header middleware
    let public_routes = Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/ws/chat/{id}", get(realtime::chat_socket));

    let protected_routes = Router::new()
        .route("/v1/auth/sync", post(users::sync_user))
        .route("/v1/me", get(users::get_me))
        .route("/v1/onboarding", post(profiles::complete_onboarding))
        .route("/v1/users/{id}", get(profiles::get_user_profile))
        .route("/v1/conversations", get(conversations::list_conversations))
        .route("/v1/conversations/start", post(conversations::start_conversation))
        .route("/v1/conversations/{id}", get(conversations::get_conversation))
        .route("/v1/conversations/{id}/messages", post(conversations::send_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}
