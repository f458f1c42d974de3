use crate::error::{AppError, Result};
use crate::models::{ExecutionOutcome, ServiceExecution};
use crate::repository::DbPool;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone)]
pub struct ExecutionRepository {
    pool: DbPool,
}

/// A captured execution about to be stored.
#[derive(Debug, Clone)]
pub struct NewServiceExecution {
    pub service_name: String,
    pub service_type: String,
    pub status: ExecutionOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    pub execution_data: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardStats {
    pub total_services: i64,
    pub total_executions: i64,
    pub recent_executions: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub success_rate: f64,
    pub avg_duration_seconds: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct ServiceExecutionRow {
    id: i64,
    service_name: String,
    service_type: String,
    status: ExecutionOutcome,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_seconds: Option<f64>,
    stdout: String,
    stderr: String,
    return_code: Option<i32>,
    execution_data: String,
    created_at: DateTime<Utc>,
}

impl From<ServiceExecutionRow> for ServiceExecution {
    fn from(row: ServiceExecutionRow) -> Self {
        Self {
            id: row.id,
            service_name: row.service_name,
            service_type: row.service_type,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_seconds: row.duration_seconds,
            stdout: row.stdout,
            stderr: row.stderr,
            return_code: row.return_code,
            // Raw payloads are informational; a damaged one is not worth failing a read.
            execution_data: serde_json::from_str(&row.execution_data).unwrap_or(Value::Null),
            created_at: row.created_at,
        }
    }
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewServiceExecution) -> Result<ServiceExecution> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO service_executions
                (service_name, service_type, status, started_at, completed_at, duration_seconds, stdout, stderr, return_code, execution_data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.service_name)
        .bind(&new.service_type)
        .bind(new.status)
        .bind(new.started_at)
        .bind(new.completed_at)
        .bind(new.duration_seconds)
        .bind(&new.stdout)
        .bind(&new.stderr)
        .bind(new.return_code)
        .bind(serde_json::to_string(&new.execution_data)?)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ServiceExecution {
            id: result.last_insert_rowid(),
            service_name: new.service_name,
            service_type: new.service_type,
            status: new.status,
            started_at: new.started_at,
            completed_at: new.completed_at,
            duration_seconds: new.duration_seconds,
            stdout: new.stdout,
            stderr: new.stderr,
            return_code: new.return_code,
            execution_data: new.execution_data,
            created_at,
        })
    }

    pub async fn get(&self, id: i64) -> Result<ServiceExecution> {
        let row = sqlx::query_as::<_, ServiceExecutionRow>(
            "SELECT * FROM service_executions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::ExecutionNotFound(id))?;

        Ok(row.into())
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<ServiceExecution>> {
        let rows = sqlx::query_as::<_, ServiceExecutionRow>(
            "SELECT * FROM service_executions ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn latest_for_service(&self, service_name: &str) -> Result<Option<ServiceExecution>> {
        let row = sqlx::query_as::<_, ServiceExecutionRow>(
            r#"
            SELECT * FROM service_executions
            WHERE service_name = ?
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Mean duration of the service's successful runs, used as a progress estimate.
    pub async fn average_success_duration(&self, service_name: &str) -> Result<Option<f64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(duration_seconds) FROM service_executions
            WHERE service_name = ? AND status = ? AND duration_seconds IS NOT NULL
            "#,
        )
        .bind(service_name)
        .bind(ExecutionOutcome::Success)
        .fetch_one(&self.pool)
        .await?;

        Ok(avg)
    }

    /// Totals over all history; the success/failure split covers executions since `since`.
    pub async fn stats(&self, since: DateTime<Utc>) -> Result<DashboardStats> {
        let total_services: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services")
            .fetch_one(&self.pool)
            .await?;

        let (total_executions, total_success, avg_duration_seconds): (i64, i64, Option<f64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0),
                       AVG(duration_seconds)
                FROM service_executions
                "#,
            )
            .bind(ExecutionOutcome::Success)
            .fetch_one(&self.pool)
            .await?;

        let (recent_executions, success_count, failure_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0)
            FROM service_executions
            WHERE started_at >= ?
            "#,
        )
        .bind(ExecutionOutcome::Success)
        .bind(ExecutionOutcome::Failed)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let success_rate = if total_executions > 0 {
            total_success as f64 / total_executions as f64 * 100.0
        } else {
            0.0
        };

        Ok(DashboardStats {
            total_services,
            total_executions,
            recent_executions,
            success_count,
            failure_count,
            success_rate,
            avg_duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;
    use serde_json::json;

    fn execution(name: &str, code: i32, started_at: DateTime<Utc>, secs: f64) -> NewServiceExecution {
        NewServiceExecution {
            service_name: name.to_string(),
            service_type: "python-script".to_string(),
            status: ExecutionOutcome::from_return_code(Some(code)),
            started_at,
            completed_at: Some(started_at + chrono::Duration::milliseconds((secs * 1000.0) as i64)),
            duration_seconds: Some(secs),
            stdout: "out".into(),
            stderr: String::new(),
            return_code: Some(code),
            execution_data: json!({"return_code": code}),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip_execution_data() {
        let (_dir, pool) = test_pool().await;
        let repo = ExecutionRepository::new(pool);

        let created = repo.create(execution("hello", 0, Utc::now(), 1.5)).await.unwrap();
        let stored = repo.get(created.id).await.unwrap();
        assert_eq!(stored.status, ExecutionOutcome::Success);
        assert_eq!(stored.execution_data, json!({"return_code": 0}));
        assert_eq!(stored.execution_time_display(), "1.50s");

        assert!(matches!(
            repo.get(created.id + 1).await,
            Err(AppError::ExecutionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn recent_and_latest_are_newest_first() {
        let (_dir, pool) = test_pool().await;
        let repo = ExecutionRepository::new(pool);
        let now = Utc::now();

        repo.create(execution("a", 0, now - chrono::Duration::minutes(2), 1.0)).await.unwrap();
        repo.create(execution("b", 1, now - chrono::Duration::minutes(1), 1.0)).await.unwrap();
        repo.create(execution("a", 1, now, 1.0)).await.unwrap();

        let recent = repo.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].service_name, "a");
        assert_eq!(recent[1].service_name, "b");

        let latest = repo.latest_for_service("a").await.unwrap().unwrap();
        assert_eq!(latest.status, ExecutionOutcome::Failed);
        assert!(repo.latest_for_service("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn average_counts_only_successful_runs() {
        let (_dir, pool) = test_pool().await;
        let repo = ExecutionRepository::new(pool);
        let now = Utc::now();

        repo.create(execution("job", 0, now, 2.0)).await.unwrap();
        repo.create(execution("job", 0, now, 4.0)).await.unwrap();
        repo.create(execution("job", 1, now, 100.0)).await.unwrap();

        assert_eq!(repo.average_success_duration("job").await.unwrap(), Some(3.0));
        assert_eq!(repo.average_success_duration("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stats_split_recent_window_from_totals() {
        let (_dir, pool) = test_pool().await;
        let repo = ExecutionRepository::new(pool);
        let now = Utc::now();

        repo.create(execution("a", 0, now - chrono::Duration::days(2), 2.0)).await.unwrap();
        repo.create(execution("a", 0, now, 4.0)).await.unwrap();
        repo.create(execution("b", 1, now, 6.0)).await.unwrap();

        let stats = repo.stats(now - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.recent_executions, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert!((stats.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.avg_duration_seconds, Some(4.0));
    }

    #[tokio::test]
    async fn empty_history_has_zero_rate() {
        let (_dir, pool) = test_pool().await;
        let stats = ExecutionRepository::new(pool).stats(Utc::now()).await.unwrap();
        assert_eq!(stats.total_executions, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_duration_seconds, None);
    }
}
