use crate::error::{AppError, Result};
use crate::executor::{CommandOutput, ServiceExecutor};
use crate::models::{
    ExecutionData, ExecutionReport, NewQueueItem, QueueEntry, QueueItem, QueueSnapshot,
};
use crate::queue::QueueState;
use crate::repository::{ExecutionRepository, QueueRepository};
use crate::services::CollectorService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub execution_timeout: Duration,
    pub history_limit: usize,
}

/// A write to the queue table, applied by the store writer in send order.
enum StoreOp {
    Insert(QueueItem),
    Update(QueueItem),
}

/// The single access point to the execution queue.
///
/// All state changes go through one mutex. Each change is handed to the
/// store writer while the lock is held, so the table sees changes in the
/// order they happened. A single dispatcher task runs at most one execution
/// at a time.
#[derive(Clone)]
pub struct QueueService {
    state: Arc<Mutex<QueueState>>,
    repo: QueueRepository,
    executions: ExecutionRepository,
    store: mpsc::UnboundedSender<StoreOp>,
    wakeup: Arc<Notify>,
}

impl QueueService {
    /// Recovers persisted state and spawns the store writer and the dispatcher.
    ///
    /// Items left running by a previous process are failed; items left queued
    /// are dispatched again in id order.
    ///
    /// With `collector` set, every finished execution is also written to the
    /// execution history; pass `None` when the capture wrapper reports them.
    pub async fn start<E: ServiceExecutor>(
        repo: QueueRepository,
        executions: ExecutionRepository,
        executor: E,
        collector: Option<CollectorService>,
        settings: QueueSettings,
    ) -> Result<Self> {
        let interrupted = repo.mark_interrupted(Utc::now()).await?;
        if interrupted > 0 {
            tracing::warn!("marked {} interrupted queue items as failed", interrupted);
        }
        let pending = repo.queued().await?;
        if !pending.is_empty() {
            tracing::info!("resuming {} queued items", pending.len());
        }
        let next_id = repo.max_id().await? + 1;
        let history = repo.recent_finished(settings.history_limit).await?;
        let state = QueueState::new(next_id, settings.history_limit)
            .with_history(history)
            .with_pending(pending);

        let (store, ops) = mpsc::unbounded_channel();
        tokio::spawn(store_writer(repo.clone(), ops));

        let service = Self {
            state: Arc::new(Mutex::new(state)),
            repo,
            executions,
            store,
            wakeup: Arc::new(Notify::new()),
        };

        let dispatcher = service.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch_loop(executor, collector, settings.execution_timeout)
                .await;
        });

        tracing::info!("execution queue started, next id {}", next_id);
        Ok(service)
    }

    /// Appends to the pending sequence. Never waits on the store or on a
    /// running execution.
    pub async fn enqueue(&self, request: NewQueueItem) -> QueueEntry {
        let entry = {
            let mut state = self.state.lock().await;
            let item = state.enqueue(request, Utc::now());
            self.persist(StoreOp::Insert(item.clone()));
            QueueEntry {
                position: state.position(item.id),
                progress_percent: 0,
                item,
            }
        };
        tracing::info!(
            "queued {} {} as #{} at position {:?}",
            entry.item.service_type,
            entry.item.service_name,
            entry.item.id,
            entry.position
        );

        self.wakeup.notify_one();
        entry
    }

    pub async fn cancel(&self, id: i64) -> Result<QueueItem> {
        let mut state = self.state.lock().await;
        let cancelled = state.cancel(id, Utc::now())?;
        self.persist(StoreOp::Update(cancelled.clone()));
        tracing::info!("cancelled queue item #{}", id);
        Ok(cancelled)
    }

    pub async fn status(&self) -> QueueSnapshot {
        self.state.lock().await.snapshot(Utc::now())
    }

    /// Current view of one item; items evicted from memory are read back from the store.
    pub async fn get(&self, id: i64) -> Result<QueueEntry> {
        let now = Utc::now();
        {
            let state = self.state.lock().await;
            if let Some(item) = state.get(id) {
                return Ok(QueueEntry {
                    position: state.position(id),
                    progress_percent: item.progress_percent(now),
                    item: item.clone(),
                });
            }
        }

        let item = self.repo.get(id).await?;
        Ok(QueueEntry {
            position: None,
            progress_percent: item.progress_percent(now),
            item,
        })
    }

    pub async fn position(&self, id: i64) -> Option<usize> {
        self.state.lock().await.position(id)
    }

    async fn dispatch_loop<E: ServiceExecutor>(
        self,
        executor: E,
        collector: Option<CollectorService>,
        timeout: Duration,
    ) {
        loop {
            let claimed = {
                let mut state = self.state.lock().await;
                let claimed = state.claim_next(Utc::now());
                if let Some(item) = &claimed {
                    self.persist(StoreOp::Update(item.clone()));
                }
                claimed
            };

            let Some(item) = claimed else {
                // A notify_one issued while nobody waits is kept for the next wait.
                self.wakeup.notified().await;
                continue;
            };

            tracing::info!("dispatching #{} {}", item.id, item.service_name);
            if item.estimated_duration.is_none() {
                self.estimate(&item).await;
            }

            let result = run_with_timeout(&executor, &item, timeout).await;
            if let Err(message) = &result {
                tracing::error!("execution #{} failed: {}", item.id, message);
            }

            let finished = {
                let mut state = self.state.lock().await;
                let finished = state.finish(item.id, result, Utc::now());
                if let Some(item) = &finished {
                    self.persist(StoreOp::Update(item.clone()));
                }
                finished
            };

            if let (Some(collector), Some(item)) = (&collector, finished) {
                if let Err(e) = collector.record(history_report(&item)).await {
                    tracing::warn!("failed to record history for #{}: {}", item.id, e);
                }
            }
        }
    }

    /// Average duration of the service's successful runs, used for progress.
    async fn estimate(&self, item: &QueueItem) {
        let estimate = match self
            .executions
            .average_success_duration(&item.service_name)
            .await
        {
            Ok(Some(estimate)) => estimate,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("no duration estimate for #{}: {}", item.id, e);
                return;
            }
        };

        let mut state = self.state.lock().await;
        if let Some(updated) = state.set_estimate(item.id, estimate) {
            self.persist(StoreOp::Update(updated));
        }
    }

    fn persist(&self, op: StoreOp) {
        if self.store.send(op).is_err() {
            tracing::error!("queue store writer has stopped");
        }
    }
}

/// Applies queue writes in order. The in-memory queue stays authoritative if
/// the store is unavailable.
async fn store_writer(repo: QueueRepository, mut ops: mpsc::UnboundedReceiver<StoreOp>) {
    while let Some(op) = ops.recv().await {
        let (id, result) = match &op {
            StoreOp::Insert(item) => (item.id, repo.insert(item).await),
            StoreOp::Update(item) => (item.id, repo.update(item).await),
        };
        if let Err(e) = result {
            tracing::error!("failed to persist queue item #{}: {}", id, e);
        }
    }
}

/// Runs one execution in its own task so a panic or a timeout cannot take
/// the dispatcher down. Aborting the task drops the executor future, which
/// kills the process tree it started.
async fn run_with_timeout<E: ServiceExecutor>(
    executor: &E,
    item: &QueueItem,
    timeout: Duration,
) -> std::result::Result<CommandOutput, String> {
    let executor = executor.clone();
    let task_item = item.clone();
    let mut handle = tokio::spawn(async move { executor.execute(&task_item).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(output))) => Ok(output),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(e)) if e.is_panic() => Err("execution panicked".to_string()),
        Ok(Err(e)) => Err(format!("execution task failed: {}", e)),
        Err(_) => {
            handle.abort();
            // Wait for the task to be dropped so the processes are gone before the next dispatch.
            let _ = handle.await;
            Err(AppError::Timeout(timeout.as_secs()).to_string())
        }
    }
}

fn history_report(item: &QueueItem) -> ExecutionReport {
    let elapsed_time = match (item.started_at, item.completed_at) {
        (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
        _ => None,
    };
    ExecutionReport {
        service_name: item.service_name.clone(),
        service_type: item.service_type.as_str().to_string(),
        operation: item.operation.map(|op| op.as_str().to_string()),
        execution_data: ExecutionData {
            return_code: item.return_code,
            stdout: item.stdout.clone().unwrap_or_default(),
            stderr: item.stderr.clone().unwrap_or_default(),
            start_time: item.started_at,
            end_time: item.completed_at,
            elapsed_time,
        },
    }
}
