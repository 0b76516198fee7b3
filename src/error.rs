use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::RateLimitedResponse;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid proxy configuration: {0}")]
    Proxy(#[from] crate::probe::ProbeError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            AppError::RateLimited { retry_after_secs } => {
                let body = RateLimitedResponse {
                    error: message,
                    retry_after: retry_after_secs,
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            AppError::Internal(detail) => {
                error!("Internal error: {}", detail);
                let body = json!({
                    "status": "offline",
                    "error": "Internal server error",
                    "timestamp": Utc::now(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
