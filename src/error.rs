use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::music::MusicGatewayError;

/// Failures surfaced by registry / engine / dispatcher operations.
///
/// The socket dispatcher converts these into unicast `error` events or
/// negative acks; HTTP routes convert them through [`AppError`]. None of them
/// terminates a connection task.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("music service failure")]
    Gateway(#[source] MusicGatewayError),
    #[error("rate limited, retry in {wait_secs}s")]
    RateLimited { wait_secs: u64 },
}

impl ServiceError {
    /// Short machine-readable code carried on `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Gateway(_) => "GATEWAY_ERROR",
            ServiceError::RateLimited { .. } => "RATE_LIMITED",
        }
    }
}

impl From<MusicGatewayError> for ServiceError {
    fn from(err: MusicGatewayError) -> Self {
        match err {
            MusicGatewayError::RateLimited { retry_after_secs } => ServiceError::RateLimited {
                wait_secs: retry_after_secs,
            },
            other => ServiceError::Gateway(other),
        }
    }
}

/// HTTP-facing error with a status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream music service error: {0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Gateway(source) => AppError::BadGateway(source.to_string()),
            ServiceError::RateLimited { wait_secs } => {
                AppError::BadGateway(format!("rate limited, retry in {wait_secs}s"))
            }
        }
    }
}

impl From<MusicGatewayError> for AppError {
    fn from(err: MusicGatewayError) -> Self {
        AppError::from(ServiceError::from(err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
