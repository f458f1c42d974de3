use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordExecutionResponse {
    pub status: String,
    pub execution_id: i64,
}
