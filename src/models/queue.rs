use super::service::{Operation, ServiceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variables, secret names and file references passed through to the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionInputs {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl ExecutionInputs {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.secrets.is_empty() && self.files.is_empty()
    }
}

/// An execution request as accepted by the queue.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub service_name: String,
    pub service_type: ServiceType,
    pub operation: Option<Operation>,
    pub inputs: ExecutionInputs,
    pub input_file: Option<String>,
    pub estimated_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub service_name: String,
    pub service_type: ServiceType,
    pub operation: Option<Operation>,
    pub status: QueueStatus,
    pub inputs: ExecutionInputs,
    pub input_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub return_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<String>,
    pub estimated_duration: Option<f64>,
}

impl QueueItem {
    pub fn new(id: i64, request: NewQueueItem, now: DateTime<Utc>) -> Self {
        Self {
            id,
            service_name: request.service_name,
            service_type: request.service_type,
            operation: request.operation,
            status: QueueStatus::Queued,
            inputs: request.inputs,
            input_file: request.input_file,
            created_at: now,
            started_at: None,
            completed_at: None,
            return_code: None,
            stdout: None,
            stderr: None,
            error: None,
            estimated_duration: request.estimated_duration,
        }
    }

    /// Best-effort completion estimate for polling clients.
    pub fn progress_percent(&self, now: DateTime<Utc>) -> u8 {
        match self.status {
            QueueStatus::Queued | QueueStatus::Cancelled => 0,
            QueueStatus::Completed | QueueStatus::Failed => 100,
            QueueStatus::Running => {
                let (Some(started), Some(estimate)) = (self.started_at, self.estimated_duration)
                else {
                    return 0;
                };
                if estimate <= 0.0 {
                    return 0;
                }
                let elapsed = (now - started).num_milliseconds().max(0) as f64 / 1000.0;
                (elapsed / estimate * 100.0).min(99.0) as u8
            }
        }
    }
}

/// A queue item as shown to polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub item: QueueItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub progress_percent: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub running_count: usize,
    pub queued_count: usize,
    pub completed_count: usize,
    pub running: Vec<QueueEntry>,
    pub queued: Vec<QueueEntry>,
    pub completed: Vec<QueueEntry>,
}
