use crate::api::dto::inputs::{LoadInputFileRequest, LoadInputFileResponse};
use crate::api::routes::AppState;
use crate::error::Result;
use axum::{Json, extract::State};

pub async fn load_input_file(
    State(state): State<AppState>,
    Json(req): Json<LoadInputFileRequest>,
) -> Result<Json<LoadInputFileResponse>> {
    let inputs = state.resolver.load_input_file(&req.file_path)?;
    Ok(Json(LoadInputFileResponse {
        status: "success".to_string(),
        inputs,
    }))
}
