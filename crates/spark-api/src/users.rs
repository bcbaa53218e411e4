use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};

use spark_auth::AuthError;
use spark_types::api::{MeResponse, SyncUserResponse};
use spark_types::models::User;

use crate::error::ApiError;
use crate::middleware::AuthenticatedIdentity;
use crate::state::{AppState, blocking};

/// Map the caller's external identity to the local user row.
pub(crate) async fn resolve_user(
    state: &AppState,
    identity: &AuthenticatedIdentity,
) -> Result<User, ApiError> {
    let db = state.db.clone();
    let uid = identity.external_uid.clone();
    blocking(move || db.get_user_by_external_uid(&uid))
        .await?
        .ok_or(ApiError::NotFound("authenticated user not found"))
}

/// POST /v1/auth/sync
///
/// Creates the local user the first time an identity is seen.
pub async fn sync_user(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let uid = identity.external_uid.clone();
    if let Some(user) = blocking(move || db.get_user_by_external_uid(&uid)).await? {
        return Ok((
            StatusCode::OK,
            Json(SyncUserResponse {
                user,
                created: false,
            }),
        ));
    }

    let profile = state
        .identity
        .get_user(&identity.external_uid)
        .await
        .map_err(|e| match e {
            AuthError::UnknownIdentity(_) => ApiError::NotFound("identity not found at provider"),
            other => {
                error!("Could not fetch identity {}: {}", identity.external_uid, other);
                ApiError::Internal(anyhow::anyhow!("could not retrieve user from identity provider"))
            }
        })?;

    let db = state.db.clone();
    let uid = identity.external_uid.clone();
    let (user, created) = blocking(move || {
        db.insert_user_if_absent(&uid, &profile.email, &profile.display_name)
    })
    .await?;

    if created {
        info!("Synced new user {} for identity {}", user.id, user.external_uid);
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(SyncUserResponse { user, created })))
}

/// GET /v1/me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Result<Json<MeResponse>, ApiError> {
    let user = resolve_user(&state, &identity).await?;

    let db = state.db.clone();
    let user_id = user.id;
    let onboarding_profile = blocking(move || db.get_profile_by_user_id(user_id)).await?;

    Ok(Json(MeResponse {
        user,
        onboarding_profile,
    }))
}
