use crate::error::Result;
use crate::executor::ToreroExecutor;
use crate::models::ServiceInfo;
use crate::repository::ServiceRepository;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Keeps the `services` table in step with what the CLI knows about.
#[derive(Clone)]
pub struct CatalogService {
    services: ServiceRepository,
    executor: ToreroExecutor,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub skipped: usize,
}

impl CatalogService {
    pub fn new(services: ServiceRepository, executor: ToreroExecutor) -> Self {
        Self { services, executor }
    }

    pub async fn sync(&self) -> Result<SyncSummary> {
        let listing = self.executor.query_json(&["get", "services"]).await?;
        let entries = listing
            .get("services")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut summary = SyncSummary::default();
        for entry in entries {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                summary.skipped += 1;
                continue;
            };

            let details = match self.executor.query_json(&["describe", "service", name]).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!("skipping service {}: {}", name, e);
                    summary.skipped += 1;
                    continue;
                }
            };

            self.services.upsert(&service_from_details(name, details)).await?;
            summary.synced += 1;
        }

        tracing::info!(
            "service sync finished: {} synced, {} skipped",
            summary.synced,
            summary.skipped
        );
        Ok(summary)
    }

    pub async fn list(&self) -> Result<Vec<ServiceInfo>> {
        self.services.list().await
    }

    pub async fn get(&self, name: &str) -> Result<ServiceInfo> {
        self.services.get(name).await
    }
}

fn service_from_details(name: &str, details: Value) -> ServiceInfo {
    let text = |key: &str| {
        details
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let tags = details
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    // The CLI reports the repository either by name or as an object.
    let repository = match details.get("repository") {
        Some(Value::String(repo)) => repo.clone(),
        Some(Value::Object(repo)) => repo
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    let now = Utc::now();
    ServiceInfo {
        name: name.to_string(),
        service_type: text("type"),
        description: text("description"),
        tags,
        repository,
        config_data: details,
        last_execution: None,
        total_executions: 0,
        success_count: 0,
        failure_count: 0,
        created_at: now,
        updated_at: now,
    }
}
