//! HTTP API in front of the bridge.
//!
//! A JSON API for dashboards and scripts, plus a static file server for the
//! web front end.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   HTTP + JSON   ┌──────────────┐   Unix socket   ┌──────────┐
//! │ browser  │────────────────▶│  API server  │────────────────▶│ fail2ban │
//! │ scripts  │                 │  (axum)      │  pickle frames  │  daemon  │
//! └──────────┘                 └──────────────┘                 └──────────┘
//! ```

pub mod server;
pub mod static_files;
pub mod types;

pub use server::{router, serve, ApiState};
pub use types::*;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::bridge::BridgeError;

/// Errors a route handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    /// A static path that resolves outside the static root.
    #[error("Not found (path)")]
    OutsideRoot,

    #[error("File not found")]
    FileNotFound { path: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::OutsideRoot | ApiError::FileNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ApiError::Bridge(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let path = match &self {
            ApiError::FileNotFound { path } => Some(path.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            path,
        };
        (status, Json(body)).into_response()
    }
}
