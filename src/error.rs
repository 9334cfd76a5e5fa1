use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use log::error;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// The store did not answer its readiness probe. Carries the operator
    /// contact message shown to clients.
    UpstreamUnavailable(String),
    Transport(reqwest::Error),
    Query(String),
    Decode(String),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Query(_) => StatusCode::BAD_GATEWAY,
            AppError::Decode(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::UpstreamUnavailable(contact) => write!(f, "{}", contact),
            AppError::Transport(e) => write!(f, "Upstream error: {}", e),
            AppError::Query(e) => write!(f, "Query error: {}", e),
            AppError::Decode(e) => write!(f, "Malformed upstream response: {}", e),
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} ({})", self, status);
        }

        (status, Json(json!({
            "status": "error",
            "error": self.to_string()
        }))).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err)
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
