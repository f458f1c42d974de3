mod torero_executor;

pub use torero_executor::{ToreroExecutor, exit_code};

use crate::error::Result;
use crate::models::QueueItem;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Captured result of one underlying CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a queued execution to completion.
///
/// The returned future is dropped when the dispatcher gives up on it, so
/// implementations must release the underlying process on drop.
pub trait ServiceExecutor: Clone + Send + Sync + 'static {
    fn execute(&self, item: &QueueItem) -> impl Future<Output = Result<CommandOutput>> + Send;
}
