mod connection;
mod execution_repository;
mod queue_repository;
mod service_repository;

pub use connection::establish_connection;
pub use execution_repository::{DashboardStats, ExecutionRepository, NewServiceExecution};
pub use queue_repository::QueueRepository;
pub use service_repository::ServiceRepository;

pub type DbPool = sqlx::SqlitePool;
