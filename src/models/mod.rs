pub mod execution;
pub mod queue;
pub mod service;

pub use execution::{ExecutionData, ExecutionOutcome, ExecutionReport, ServiceExecution};
pub use queue::{ExecutionInputs, NewQueueItem, QueueEntry, QueueItem, QueueSnapshot, QueueStatus};
pub use service::{Operation, ServiceInfo, ServiceType};
