use crate::error::{AppError, Result};
use crate::models::{ExecutionInputs, QueueItem};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    pub operation: Option<String>,
    pub inputs: Option<ExecutionInputs>,
    pub input_file: Option<String>,
}

impl ExecuteRequest {
    /// An empty body is a request without options.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub status: String,
    pub queue_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: String,
    pub queue_id: i64,
    pub message: String,
}

impl From<QueueItem> for CancelResponse {
    fn from(item: QueueItem) -> Self {
        Self {
            status: item.status.to_string(),
            queue_id: item.id,
            message: format!("execution of {} cancelled", item.service_name),
        }
    }
}
