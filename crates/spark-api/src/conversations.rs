use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use spark_gateway::delivery::deliver_message;
use spark_types::api::{SendMessageRequest, StartConversationRequest};
use spark_types::models::{ConversationDetails, ConversationPreview};

use crate::error::ApiError;
use crate::middleware::AuthenticatedIdentity;
use crate::state::{AppState, blocking};
use crate::users::resolve_user;

/// POST /v1/conversations/start
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    WithRejection(Json(req), _): WithRejection<Json<StartConversationRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = resolve_user(&state, &identity).await?;

    let db = state.db.clone();
    let conversation = blocking(move || {
        db.start_conversation(sender.id, req.recipient_id, &req.content)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /v1/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Result<Json<Vec<ConversationPreview>>, ApiError> {
    let user = resolve_user(&state, &identity).await?;

    let db = state.db.clone();
    let previews = blocking(move || db.list_conversations_for_user(user.id)).await?;
    Ok(Json(previews))
}

/// GET /v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Result<Json<ConversationDetails>, ApiError> {
    let user = resolve_user(&state, &identity).await?;

    let db = state.db.clone();
    let details =
        blocking(move || db.get_conversation_with_history(conversation_id, user.id)).await?;
    Ok(Json(details))
}

/// POST /v1/conversations/{id}/messages
///
/// Live viewers get the message from the commit hook, so pushes leave in
/// the same order the writes committed.
pub async fn send_message(
    State(state): State<AppState>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = resolve_user(&state, &identity).await?;

    let db = state.db.clone();
    let hub = state.hub.clone();
    let message = blocking(move || {
        db.add_message_then(conversation_id, sender.id, &req.content, |message| {
            deliver_message(&hub, message);
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
