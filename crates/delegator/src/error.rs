//! Delegator error — mirrors the teacher's `ApiError`: named variants with
//! an `IntoResponse` impl instead of the GraphQL `extend` mapping, since
//! this front door speaks plain HTTP rather than GraphQL.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelegatorError {
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    #[error("network not found: {0}")]
    NetworkNotFound(String),

    #[error("missing or invalid token")]
    Unauthorized,

    #[error("user not authorized for this network")]
    Forbidden,

    #[error("feature unavailable")]
    FeatureUnavailable,

    #[error("internal context missing: {0}")]
    ContextMissing(String),

    #[error("upstream unreachable: {0}")]
    Upstream(String),
}

impl DelegatorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DelegatorError::InvalidFeature(_) => StatusCode::BAD_REQUEST,
            DelegatorError::NetworkNotFound(_) => StatusCode::NOT_FOUND,
            DelegatorError::Unauthorized => StatusCode::UNAUTHORIZED,
            DelegatorError::Forbidden => StatusCode::FORBIDDEN,
            DelegatorError::FeatureUnavailable => StatusCode::NOT_FOUND,
            DelegatorError::ContextMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DelegatorError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DelegatorError {
    fn into_response(self) -> Response {
        if matches!(self, DelegatorError::Upstream(ref detail) if !detail.is_empty()) {
            tracing::warn!(error = %self, "upstream request failed");
        }
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type DelegatorResult<T> = Result<T, DelegatorError>;
