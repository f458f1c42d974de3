use crate::api::dto::services::{ServicesListResponse, SyncResponse};
use crate::api::routes::AppState;
use crate::error::Result;
use axum::{Json, extract::State};

pub async fn list_services(State(state): State<AppState>) -> Result<Json<ServicesListResponse>> {
    let services = state.catalog.list().await?;
    Ok(Json(ServicesListResponse { services }))
}

pub async fn sync_services(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let summary = state.catalog.sync().await?;
    Ok(Json(SyncResponse {
        status: "success".to_string(),
        summary,
    }))
}
