use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const MODEL_NOT_LOADED: &str = "Model not loaded properly";
pub const OUT_OF_MEMORY: &str =
    "GPU out of memory. Try reducing the image size or close other applications.";

/// Every failure the HTTP surface can report.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", MODEL_NOT_LOADED)]
    ModelNotLoaded,

    #[error("{}", OUT_OF_MEMORY)]
    OutOfMemory,

    /// The underlying cause is logged under `correlation_id` and never sent to the client.
    #[error("Image generation failed (correlation id: {correlation_id})")]
    Generation { correlation_id: Uuid },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body, `{"detail": "..."}`.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ModelNotLoaded
            | ApiError::OutOfMemory
            | ApiError::Generation { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
