use crate::api::dto::queue::{CancelResponse, ExecuteRequest, ExecuteResponse};
use crate::api::routes::AppState;
use crate::error::{AppError, Result};
use crate::models::{NewQueueItem, Operation, QueueEntry, QueueSnapshot, ServiceType};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};

pub async fn execute_service(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
    body: Bytes,
) -> Result<Json<ExecuteResponse>> {
    let req = ExecuteRequest::from_body(&body)?;

    let service = state.catalog.get(&service_name).await?;
    let service_type: ServiceType = service.service_type.parse()?;

    let operation = match req.operation.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(op) => {
            let op: Operation = op.parse()?;
            if !service_type.takes_operation() {
                return Err(AppError::BadRequest(format!(
                    "{} services do not take an operation",
                    service_type
                )));
            }
            Some(op)
        }
    };
    let operation = service_type
        .takes_operation()
        .then(|| operation.unwrap_or_default());

    let queued = state
        .queue
        .enqueue(NewQueueItem {
            service_name: service.name,
            service_type,
            operation,
            inputs: req.inputs.unwrap_or_default(),
            input_file: req.input_file.filter(|path| !path.trim().is_empty()),
            estimated_duration: None,
        })
        .await;

    // The dispatcher may already have picked it up.
    let current = state.queue.get(queued.item.id).await?;
    let response = match current.position {
        Some(position) => ExecuteResponse {
            status: "queued".to_string(),
            queue_id: current.item.id,
            position: Some(position),
            message: format!(
                "execution of {} queued at position {}",
                current.item.service_name, position
            ),
        },
        None => ExecuteResponse {
            status: "started".to_string(),
            queue_id: current.item.id,
            position: None,
            message: format!("execution of {} started", current.item.service_name),
        },
    };
    Ok(Json(response))
}

pub async fn queue_status(State(state): State<AppState>) -> Json<QueueSnapshot> {
    Json(state.queue.status().await)
}

pub async fn get_queue_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<QueueEntry>> {
    Ok(Json(state.queue.get(id).await?))
}

pub async fn cancel_queue_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CancelResponse>> {
    let cancelled = state.queue.cancel(id).await?;
    Ok(Json(CancelResponse::from(cancelled)))
}
