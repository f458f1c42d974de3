//! Helpers shared by unit tests.

use crate::error::{AppError, Result};
use crate::executor::{CommandOutput, ServiceExecutor};
use crate::models::QueueItem;
use crate::repository::{DbPool, establish_connection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// A fresh database in its own directory; keep the `TempDir` alive for the test.
pub async fn test_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    let pool = establish_connection(&url).await.unwrap();
    (dir, pool)
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Exit(i32),
    Error(String),
    Panic,
    Hang,
}

/// Executor whose runs block until the test releases them by service name.
#[derive(Clone, Default)]
pub struct GatedExecutor {
    inner: Arc<GatedInner>,
}

#[derive(Default)]
struct GatedInner {
    started: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    behaviors: Mutex<HashMap<String, Behavior>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

struct RunningGuard(Arc<GatedInner>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, name: &str, behavior: Behavior) {
        self.inner
            .behaviors
            .lock()
            .unwrap()
            .insert(name.to_string(), behavior);
    }

    pub fn release(&self, name: &str) {
        self.gate(name).notify_one();
    }

    /// Service names in the order their executions began.
    pub fn started(&self) -> Vec<String> {
        self.inner.started.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.inner.max_running.load(Ordering::SeqCst)
    }

    fn gate(&self, name: &str) -> Arc<Notify> {
        self.inner
            .gates
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

impl ServiceExecutor for GatedExecutor {
    async fn execute(&self, item: &QueueItem) -> Result<CommandOutput> {
        let now_running = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .max_running
            .fetch_max(now_running, Ordering::SeqCst);
        let _guard = RunningGuard(self.inner.clone());
        self.inner
            .started
            .lock()
            .unwrap()
            .push(item.service_name.clone());

        let behavior = self
            .inner
            .behaviors
            .lock()
            .unwrap()
            .get(&item.service_name)
            .cloned()
            .unwrap_or(Behavior::Exit(0));

        match behavior {
            Behavior::Hang => std::future::pending::<()>().await,
            Behavior::Panic => panic!("executor panicked for {}", item.service_name),
            _ => self.gate(&item.service_name).notified().await,
        }

        match behavior {
            Behavior::Exit(code) => Ok(CommandOutput {
                return_code: code,
                stdout: format!("{} done\n", item.service_name),
                stderr: String::new(),
            }),
            Behavior::Error(message) => Err(AppError::Execution(message)),
            Behavior::Panic | Behavior::Hang => unreachable!(),
        }
    }
}
