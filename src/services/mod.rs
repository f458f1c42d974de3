mod catalog_service;
mod collector_service;
mod queue_service;

pub use catalog_service::{CatalogService, SyncSummary};
pub use collector_service::{CollectorService, DashboardData, ServiceSummary};
pub use queue_service::{QueueService, QueueSettings};
