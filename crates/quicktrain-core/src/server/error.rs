//! HTTP error responses.
//!
//! Every failure is answered with `{"error": "<message>"}`: 400 for problems with the
//! request, 500 for problems on our side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quicktrain_orchestrator::DispatchError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The body is not a JSON training request (400)
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Validation or launch failure from the dispatcher
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Dispatch(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
