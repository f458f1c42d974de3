use crate::error::{AppError, Result};
use crate::models::{Operation, QueueItem, QueueStatus, ServiceType};
use crate::repository::DbPool;
use chrono::{DateTime, Utc};

pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

#[derive(Clone)]
pub struct QueueRepository {
    pool: DbPool,
}

#[derive(sqlx::FromRow)]
struct QueueItemRow {
    id: i64,
    service_name: String,
    service_type: ServiceType,
    operation: Option<Operation>,
    status: QueueStatus,
    inputs: String,
    input_file: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    return_code: Option<i32>,
    stdout: Option<String>,
    stderr: Option<String>,
    error: Option<String>,
    estimated_duration: Option<f64>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = AppError;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            service_name: row.service_name,
            service_type: row.service_type,
            operation: row.operation,
            status: row.status,
            inputs: serde_json::from_str(&row.inputs)?,
            input_file: row.input_file,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            return_code: row.return_code,
            stdout: row.stdout,
            stderr: row.stderr,
            error: row.error,
            estimated_duration: row.estimated_duration,
        })
    }
}

impl QueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, item: &QueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_items (id, service_name, service_type, operation, status, inputs, input_file, created_at, estimated_duration)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id)
        .bind(&item.service_name)
        .bind(item.service_type)
        .bind(item.operation)
        .bind(item.status)
        .bind(serde_json::to_string(&item.inputs)?)
        .bind(&item.input_file)
        .bind(item.created_at)
        .bind(item.estimated_duration)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persists the mutable lifecycle fields.
    pub async fn update(&self, item: &QueueItem) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_items
            SET status = ?, started_at = ?, completed_at = ?, return_code = ?, stdout = ?, stderr = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(item.status)
        .bind(item.started_at)
        .bind(item.completed_at)
        .bind(item.return_code)
        .bind(&item.stdout)
        .bind(&item.stderr)
        .bind(&item.error)
        .bind(item.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<QueueItem> {
        let row = sqlx::query_as::<_, QueueItemRow>("SELECT * FROM queue_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::QueueItemNotFound(id))?;

        row.try_into()
    }

    pub async fn max_id(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM queue_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    /// An item a previous process left running can no longer complete.
    pub async fn mark_interrupted(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = ?, completed_at = ?, error = ?, stderr = COALESCE(stderr, ?)
            WHERE status = ?
            "#,
        )
        .bind(QueueStatus::Failed)
        .bind(now)
        .bind(INTERRUPTED_MESSAGE)
        .bind(INTERRUPTED_MESSAGE)
        .bind(QueueStatus::Running)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Items still waiting for dispatch, oldest first.
    pub async fn queued(&self) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueItemRow>(
            "SELECT * FROM queue_items WHERE status = ? ORDER BY id ASC",
        )
        .bind(QueueStatus::Queued)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueItem::try_from).collect()
    }

    /// Finished items, most recently completed first.
    pub async fn recent_finished(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueItemRow>(
            r#"
            SELECT * FROM queue_items
            WHERE status IN (?, ?, ?)
            ORDER BY completed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(QueueStatus::Completed)
        .bind(QueueStatus::Failed)
        .bind(QueueStatus::Cancelled)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueItem::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionInputs, NewQueueItem};
    use crate::test_support::test_pool;
    use serde_json::json;

    fn item(id: i64) -> QueueItem {
        let mut inputs = ExecutionInputs::default();
        inputs.variables.insert("region".into(), json!("us-east-1"));
        QueueItem::new(
            id,
            NewQueueItem {
                service_name: "vpc".into(),
                service_type: ServiceType::OpentofuPlan,
                operation: Some(Operation::Destroy),
                inputs,
                input_file: Some("@inputs/vpc.yaml".into()),
                estimated_duration: Some(12.5),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_update_and_get() {
        let (_dir, pool) = test_pool().await;
        let repo = QueueRepository::new(pool);

        let mut queued = item(1);
        repo.insert(&queued).await.unwrap();

        queued.status = QueueStatus::Failed;
        queued.started_at = Some(Utc::now());
        queued.completed_at = Some(Utc::now());
        queued.return_code = Some(2);
        queued.stderr = Some("boom".into());
        repo.update(&queued).await.unwrap();

        let stored = repo.get(1).await.unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.operation, Some(Operation::Destroy));
        assert_eq!(stored.service_type, ServiceType::OpentofuPlan);
        assert_eq!(stored.inputs, queued.inputs);
        assert_eq!(stored.return_code, Some(2));
        assert_eq!(stored.stderr.as_deref(), Some("boom"));

        assert!(matches!(
            repo.get(2).await,
            Err(AppError::QueueItemNotFound(2))
        ));
    }

    #[tokio::test]
    async fn running_items_fail_on_recovery_and_queued_items_survive() {
        let (_dir, pool) = test_pool().await;
        let repo = QueueRepository::new(pool);

        let queued = item(1);
        let mut running = item(2);
        running.status = QueueStatus::Running;
        let mut done = item(3);
        done.status = QueueStatus::Completed;
        done.completed_at = Some(Utc::now());
        for it in [&queued, &running, &done] {
            repo.insert(it).await.unwrap();
        }
        repo.update(&running).await.unwrap();
        repo.update(&done).await.unwrap();

        assert_eq!(repo.mark_interrupted(Utc::now()).await.unwrap(), 1);
        let recovered = repo.get(2).await.unwrap();
        assert_eq!(recovered.status, QueueStatus::Failed);
        assert_eq!(recovered.error.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(repo.get(3).await.unwrap().status, QueueStatus::Completed);

        let waiting = repo.queued().await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, 1);
        assert_eq!(waiting[0].status, QueueStatus::Queued);
        assert_eq!(waiting[0].error, None);

        assert_eq!(repo.max_id().await.unwrap(), 3);
        assert_eq!(repo.recent_finished(10).await.unwrap().len(), 2);
        assert_eq!(repo.recent_finished(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_table_has_max_id_zero() {
        let (_dir, pool) = test_pool().await;
        assert_eq!(QueueRepository::new(pool).max_id().await.unwrap(), 0);
    }
}
