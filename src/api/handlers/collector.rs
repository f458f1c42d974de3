use crate::api::dto::collector::RecordExecutionResponse;
use crate::api::routes::AppState;
use crate::error::Result;
use crate::models::{ExecutionReport, ServiceExecution};
use crate::services::DashboardData;
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn record_execution(
    State(state): State<AppState>,
    Json(report): Json<ExecutionReport>,
) -> Result<Json<RecordExecutionResponse>> {
    let execution = state.collector.record(report).await?;
    Ok(Json(RecordExecutionResponse {
        status: "success".to_string(),
        execution_id: execution.id,
    }))
}

pub async fn dashboard_data(State(state): State<AppState>) -> Result<Json<DashboardData>> {
    Ok(Json(state.collector.dashboard().await?))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ServiceExecution>> {
    Ok(Json(state.collector.get_execution(id).await?))
}
