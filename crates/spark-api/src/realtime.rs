use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::Response,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use spark_gateway::connection::handle_viewer;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatSocketQuery {
    #[serde(default)]
    pub token: String,
}

/// GET /v1/ws/chat/{id}?token=...
///
/// Browsers cannot set headers on a websocket handshake, so the credential
/// travels in the query string. The gate runs before the upgrade; a rejected
/// viewer gets a plain HTTP error and never reaches the hub.
pub async fn chat_socket(
    State(state): State<AppState>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<ChatSocketQuery>, ApiError>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let admission = state.gate.admit(&query.token, conversation_id).await?;

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_viewer(socket, hub, admission)))
}
