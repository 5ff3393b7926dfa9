pub mod config;
pub mod models;
pub mod util;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// JSON body returned for every error response of the API.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
}

pub enum AppError {
    Status(StatusCode),
    /// Only the outermost `anyhow` context is sent to the client; the full chain is logged.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Status(status) if status == StatusCode::NOT_FOUND => {
                (status, Json(ErrorBody { error: "Not found" })).into_response()
            }
            Self::Status(status) => {
                let reason = status.canonical_reason().unwrap_or("Unknown error");
                (status, Json(ErrorBody { error: reason })).into_response()
            }
            Self::Internal(err) => {
                tracing::error!("{:?}", err);
                let message = err.to_string();
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: &message }))
                    .into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self { Self::Internal(err.into()) }
}
