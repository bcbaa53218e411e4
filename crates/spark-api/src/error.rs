//! HTTP error type and its mapping from store and gate outcomes.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use spark_db::StoreError;
use spark_gateway::gate::GateError;
use spark_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    PolicyViolation(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::PolicyViolation(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::PolicyViolation(_) => "POLICY_VIOLATION",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "an internal server error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: self.error_code().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound("not found"),
            StoreError::Forbidden => Self::Forbidden("user is not part of this conversation"),
            StoreError::Conflict => Self::Conflict("conversation already exists"),
            StoreError::PolicyViolation(reason) => Self::PolicyViolation(reason),
            StoreError::InvalidInput(reason) => Self::BadRequest(reason.to_string()),
            StoreError::Internal(e) => Self::Internal(e),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Unauthenticated => Self::Unauthorized("invalid auth token"),
            GateError::UnknownUser => Self::Forbidden("user not found"),
            GateError::NotParticipant => {
                Self::Forbidden("you are not a participant of this conversation")
            }
            GateError::Internal(e) => Self::Internal(e),
        }
    }
}

// Extractor rejections are wired in with `axum_extra::extract::WithRejection`
// so malformed requests get the same JSON error body as everything else.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("invalid request: {}", rejection.body_text()))
    }
}

/// Every path parameter is an id; one that does not parse names nothing.
impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        Self::NotFound("not found")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(format!("invalid request: {}", rejection.body_text()))
    }
}
