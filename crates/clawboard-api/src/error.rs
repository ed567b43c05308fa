//! API error envelope.
//!
//! Every failure leaves the service as `{"detail": ...}` with a mapped
//! status code; raw internal errors never leak to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use clawboard_ingest::IngestError;
use clawboard_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid token")]
    Unauthorized,

    #[error("Server token is not configured. Set CLAWBOARD_TOKEN.")]
    TokenUnavailable,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Not found")]
    NotFound,

    #[error("Store busy, retry later")]
    Busy,

    #[error("Internal error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::TokenUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::Busy { .. } => ApiError::Busy,
            other => {
                error!(error = %other, "store error");
                ApiError::Internal
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(detail) => ApiError::Unprocessable(detail),
            IngestError::NotFound(_) => ApiError::NotFound,
            IngestError::Store(store) => store.into(),
        }
    }
}
