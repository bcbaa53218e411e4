use axum::{
    Extension, Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use spark_types::api::{OnboardingRequest, PublicUserProfile};
use spark_types::models::Profile;

use crate::error::ApiError;
use crate::middleware::AuthenticatedIdentity;
use crate::state::{AppState, blocking};
use crate::users::resolve_user;

/// POST /v1/onboarding
///
/// Creates or replaces the caller's profile and returns what was stored.
pub async fn complete_onboarding(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    WithRejection(Json(req), _): WithRejection<Json<OnboardingRequest>, ApiError>,
) -> Result<Json<Profile>, ApiError> {
    let user = resolve_user(&state, &identity).await?;

    let db = state.db.clone();
    let profile = Profile::from(req);
    let stored = blocking(move || db.upsert_profile(user.id, &profile)).await?;
    Ok(Json(stored))
}

/// GET /v1/users/{id}
pub async fn get_user_profile(
    State(state): State<AppState>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<PublicUserProfile>, ApiError> {
    let db = state.db.clone();
    let found = blocking(move || -> anyhow::Result<_> {
        let Some(user) = db.get_user_by_id(user_id)? else {
            return Ok(None);
        };
        let profile = db.get_profile_by_user_id(user.id)?;
        Ok(Some((user, profile)))
    })
    .await?;

    let (user, onboarding_profile) = found.ok_or(ApiError::NotFound("user not found"))?;
    Ok(Json(PublicUserProfile {
        id: user.id,
        display_name: user.display_name,
        onboarding_profile,
    }))
}
