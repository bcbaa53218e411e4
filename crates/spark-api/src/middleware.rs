use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use spark_auth::{AuthError, bearer_token};

use crate::error::ApiError;
use crate::state::AppState;

/// External identity of the caller, as vouched for by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub external_uid: String,
}

/// Verify the bearer token with the identity provider and attach the
/// resulting identity to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("authorization header is not provided"))?;

    let token = bearer_token(auth_header)
        .ok_or(ApiError::Unauthorized("invalid authorization header format"))?;

    let external_uid = state.identity.verify_token(token).await.map_err(|e| match e {
        AuthError::Unavailable(reason) => {
            error!("Identity provider unavailable: {}", reason);
            ApiError::Internal(anyhow::anyhow!("identity provider unavailable"))
        }
        other => {
            debug!("Rejected bearer token: {}", other);
            ApiError::Unauthorized("invalid id token")
        }
    })?;

    req.extensions_mut()
        .insert(AuthenticatedIdentity { external_uid });
    Ok(next.run(req).await)
}
