use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

/// The boundary error type. Every failure below the HTTP layer ends up in
/// one of these variants and is rendered as `{detail: "..."}`.
#[derive(Debug)]
pub enum AppError {
    /// Anything converted via `?`: file I/O, config parsing, and friends.
    Internal(anyhow::Error),
    /// A failed operation against the engine or its logs, already carrying
    /// the operation prefix ("Download failed: ...").
    Engine(String),
    /// A resolution string that is not "WIDTHxHEIGHT".
    InvalidResolution(String),
    /// A missing file under the download directory.
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal server error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Engine(msg) => {
                tracing::error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::InvalidResolution(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(json!({ "detail": detail }));
        (status, body).into_response()
    }
}

// Lets handlers use `?` on anything that converts into anyhow::Error.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
