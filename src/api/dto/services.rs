use crate::models::ServiceInfo;
use crate::services::SyncSummary;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ServicesListResponse {
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: String,
    #[serde(flatten)]
    pub summary: SyncSummary,
}
