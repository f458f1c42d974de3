use crate::error::{AppError, Result};
use crate::executor::CommandOutput;
use crate::models::{NewQueueItem, QueueEntry, QueueItem, QueueSnapshot, QueueStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

/// Pending FIFO, the single running slot and a bounded window of finished items.
#[derive(Debug)]
pub struct QueueState {
    next_id: i64,
    items: HashMap<i64, QueueItem>,
    pending: VecDeque<i64>,
    running: Option<i64>,
    // Most recent first.
    finished: VecDeque<i64>,
    history_limit: usize,
}

impl QueueState {
    pub fn new(next_id: i64, history_limit: usize) -> Self {
        Self {
            next_id,
            items: HashMap::new(),
            pending: VecDeque::new(),
            running: None,
            finished: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Seeds the finished window, most recent first. Non-terminal items are ignored.
    pub fn with_history(mut self, recent: Vec<QueueItem>) -> Self {
        for item in recent
            .into_iter()
            .filter(|item| item.status.is_terminal())
            .take(self.history_limit)
        {
            self.next_id = self.next_id.max(item.id + 1);
            self.finished.push_back(item.id);
            self.items.insert(item.id, item);
        }
        self
    }

    /// Restores items a previous process left queued, in id order.
    pub fn with_pending(mut self, mut queued: Vec<QueueItem>) -> Self {
        queued.retain(|item| item.status == QueueStatus::Queued);
        queued.sort_by_key(|item| item.id);
        for item in queued {
            self.next_id = self.next_id.max(item.id + 1);
            self.pending.push_back(item.id);
            self.items.insert(item.id, item);
        }
        self
    }

    pub fn enqueue(&mut self, request: NewQueueItem, now: DateTime<Utc>) -> QueueItem {
        let id = self.next_id;
        self.next_id += 1;

        let item = QueueItem::new(id, request, now);
        self.items.insert(id, item.clone());
        self.pending.push_back(id);
        item
    }

    /// Moves the head of the pending sequence into the running slot, if the slot is free.
    pub fn claim_next(&mut self, now: DateTime<Utc>) -> Option<QueueItem> {
        if self.running.is_some() {
            return None;
        }
        let id = self.pending.pop_front()?;
        let item = self.items.get_mut(&id)?;
        item.status = QueueStatus::Running;
        item.started_at = Some(now);
        self.running = Some(id);
        Some(item.clone())
    }

    /// Sets the duration estimate of the running item.
    pub fn set_estimate(&mut self, id: i64, estimate: f64) -> Option<QueueItem> {
        if self.running != Some(id) {
            return None;
        }
        let item = self.items.get_mut(&id)?;
        item.estimated_duration = Some(estimate);
        Some(item.clone())
    }

    /// Records the result of the running item and frees the slot.
    ///
    /// `Err` carries the message of a dispatch failure (spawn error, timeout,
    /// panic); it replaces the output.
    pub fn finish(
        &mut self,
        id: i64,
        result: std::result::Result<CommandOutput, String>,
        now: DateTime<Utc>,
    ) -> Option<QueueItem> {
        if self.running != Some(id) {
            return None;
        }
        self.running = None;

        let item = self.items.get_mut(&id)?;
        item.completed_at = Some(now);
        match result {
            Ok(output) => {
                item.status = if output.return_code == 0 {
                    QueueStatus::Completed
                } else {
                    QueueStatus::Failed
                };
                item.return_code = Some(output.return_code);
                item.stdout = Some(output.stdout);
                item.stderr = Some(output.stderr);
            }
            Err(message) => {
                item.status = QueueStatus::Failed;
                item.stdout = Some(String::new());
                item.stderr = Some(message.clone());
                item.error = Some(message);
            }
        }
        let finished = item.clone();
        self.push_finished(id);
        Some(finished)
    }

    pub fn cancel(&mut self, id: i64, now: DateTime<Utc>) -> Result<QueueItem> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(AppError::QueueItemNotFound(id))?;
        if item.status != QueueStatus::Queued {
            return Err(AppError::NotCancellable {
                id,
                status: item.status,
            });
        }

        item.status = QueueStatus::Cancelled;
        item.completed_at = Some(now);
        let cancelled = item.clone();
        self.pending.retain(|pending| *pending != id);
        self.push_finished(id);
        Ok(cancelled)
    }

    /// 1-based rank among queued items, computed on every call.
    pub fn position(&self, id: i64) -> Option<usize> {
        self.pending
            .iter()
            .position(|pending| *pending == id)
            .map(|index| index + 1)
    }

    pub fn get(&self, id: i64) -> Option<&QueueItem> {
        self.items.get(&id)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> QueueSnapshot {
        let entry = |id: &i64, position: Option<usize>| {
            self.items.get(id).map(|item| QueueEntry {
                progress_percent: item.progress_percent(now),
                item: item.clone(),
                position,
            })
        };

        let running: Vec<_> = self.running.iter().filter_map(|id| entry(id, None)).collect();
        let queued: Vec<_> = self
            .pending
            .iter()
            .enumerate()
            .filter_map(|(index, id)| entry(id, Some(index + 1)))
            .collect();
        let completed: Vec<_> = self
            .finished
            .iter()
            .filter_map(|id| entry(id, None))
            .collect();

        QueueSnapshot {
            running_count: running.len(),
            queued_count: queued.len(),
            completed_count: completed.len(),
            running,
            queued,
            completed,
        }
    }

    fn push_finished(&mut self, id: i64) {
        self.finished.push_front(id);
        while self.finished.len() > self.history_limit {
            if let Some(evicted) = self.finished.pop_back() {
                self.items.remove(&evicted);
            }
        }
    }
}
