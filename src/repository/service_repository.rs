use crate::error::{AppError, Result};
use crate::models::{ExecutionOutcome, ServiceInfo};
use crate::repository::DbPool;
use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Clone)]
pub struct ServiceRepository {
    pool: DbPool,
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    name: String,
    service_type: String,
    description: String,
    tags: String,
    repository: String,
    config_data: String,
    last_execution: Option<DateTime<Utc>>,
    total_executions: i64,
    success_count: i64,
    failure_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ServiceRow> for ServiceInfo {
    fn from(row: ServiceRow) -> Self {
        Self {
            name: row.name,
            service_type: row.service_type,
            description: row.description,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            repository: row.repository,
            config_data: serde_json::from_str(&row.config_data).unwrap_or(Value::Null),
            last_execution: row.last_execution,
            total_executions: row.total_executions,
            success_count: row.success_count,
            failure_count: row.failure_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl ServiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ServiceInfo>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, name: &str) -> Result<ServiceInfo> {
        self.find(name)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(name.to_string()))
    }

    pub async fn find(&self, name: &str) -> Result<Option<ServiceInfo>> {
        let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Services reported by the wrapper before any sync are created on the fly.
    pub async fn get_or_create(&self, name: &str, service_type: &str) -> Result<ServiceInfo> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO services (name, service_type, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(service_type)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(name).await
    }

    /// Inserts or refreshes catalog fields; execution statistics are left untouched.
    pub async fn upsert(&self, service: &ServiceInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO services (name, service_type, description, tags, repository, config_data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                service_type = excluded.service_type,
                description = excluded.description,
                tags = excluded.tags,
                repository = excluded.repository,
                config_data = excluded.config_data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&service.name)
        .bind(&service.service_type)
        .bind(&service.description)
        .bind(serde_json::to_string(&service.tags)?)
        .bind(&service.repository)
        .bind(serde_json::to_string(&service.config_data)?)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_outcome(
        &self,
        name: &str,
        outcome: ExecutionOutcome,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let (success, failure) = match outcome {
            ExecutionOutcome::Success => (1, 0),
            ExecutionOutcome::Failed => (0, 1),
        };
        let result = sqlx::query(
            r#"
            UPDATE services
            SET last_execution = ?,
                total_executions = total_executions + 1,
                success_count = success_count + ?,
                failure_count = failure_count + ?,
                updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(at)
        .bind(success)
        .bind(failure)
        .bind(Utc::now())
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ServiceNotFound(name.to_string()));
        }
        Ok(())
    }
}
