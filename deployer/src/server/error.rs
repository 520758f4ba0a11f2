//! Mapping of service errors onto HTTP responses

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::errors::DeployError;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
}

/// A `DeployError` on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub DeployError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DeployError::ValidationError(_) | DeployError::JsonError(_) => StatusCode::BAD_REQUEST,
            DeployError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DeployError::Forbidden(_) => StatusCode::FORBIDDEN,
            DeployError::NotFound(_) => StatusCode::NOT_FOUND,
            DeployError::Conflict(_) | DeployError::InvalidTransition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            DeployError::ValidationError(msg)
            | DeployError::Unauthorized(msg)
            | DeployError::Forbidden(msg)
            | DeployError::NotFound(msg)
            | DeployError::Conflict(msg) => msg.clone(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: true,
                message,
            }),
        )
            .into_response()
    }
}
