use crate::models::ExecutionInputs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoadInputFileRequest {
    pub file_path: String,
}

#[derive(Debug, Serialize)]
pub struct LoadInputFileResponse {
    pub status: String,
    pub inputs: ExecutionInputs,
}
