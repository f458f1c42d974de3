use crate::repository::DbPool;
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

pub async fn establish_connection(database_url: &str) -> Result<DbPool> {
    // Ensure the database URL has the correct format
    let db_url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{}", database_url)
    };

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    // In-memory databases exist per connection.
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    // Run migrations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS services (
            name TEXT PRIMARY KEY,
            service_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            repository TEXT NOT NULL DEFAULT '',
            config_data TEXT NOT NULL DEFAULT '{}',
            last_execution TEXT,
            total_executions INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS service_executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL,
            service_type TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            duration_seconds REAL,
            stdout TEXT NOT NULL DEFAULT '',
            stderr TEXT NOT NULL DEFAULT '',
            return_code INTEGER,
            execution_data TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS queue_items (
            id INTEGER PRIMARY KEY,
            service_name TEXT NOT NULL,
            service_type TEXT NOT NULL,
            operation TEXT,
            status TEXT NOT NULL,
            inputs TEXT NOT NULL DEFAULT '{}',
            input_file TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            return_code INTEGER,
            stdout TEXT,
            stderr TEXT,
            error TEXT,
            estimated_duration REAL
        );

        CREATE INDEX IF NOT EXISTS idx_executions_service_started
            ON service_executions(service_name, started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_executions_status_started
            ON service_executions(status, started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_queue_items_status ON queue_items(status);
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}
