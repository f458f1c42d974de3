use crate::models::QueueStatus;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Queue item not found: {0}")]
    QueueItemNotFound(i64),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(i64),

    #[error("Queue item {id} is {status} and cannot be cancelled")]
    NotCancellable { id: i64, status: QueueStatus },

    #[error("Unsupported service type: {0}")]
    UnsupportedServiceType(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Input file error: {0}")]
    InputFile(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("Report error: {0}")]
    Report(#[from] reqwest::Error),

    #[error("Wrapper install error: {0}")]
    Wrapper(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ServiceNotFound(_)
            | AppError::QueueItemNotFound(_)
            | AppError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotCancellable { .. }
            | AppError::UnsupportedServiceType(_)
            | AppError::BadRequest(_)
            | AppError::InputFile(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Execution(_) | AppError::Report(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Wrapper(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "status": "error",
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
