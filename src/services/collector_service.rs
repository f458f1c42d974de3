use crate::error::{AppError, Result};
use crate::models::{ExecutionOutcome, ExecutionReport, ServiceExecution, ServiceInfo};
use crate::repository::{DashboardStats, ExecutionRepository, NewServiceExecution, ServiceRepository};
use chrono::{NaiveTime, Utc};
use serde::Serialize;

const RECENT_EXECUTIONS: i64 = 20;

/// Stores captured executions and aggregates them for the dashboard.
#[derive(Clone)]
pub struct CollectorService {
    executions: ExecutionRepository,
    services: ServiceRepository,
}

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub stats: DashboardStats,
    pub recent_executions: Vec<ServiceExecution>,
    pub services: Vec<ServiceSummary>,
}

#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    #[serde(flatten)]
    pub info: ServiceInfo,
    pub success_rate: f64,
    pub latest_status: Option<ExecutionOutcome>,
    pub latest_execution_time: Option<String>,
}

impl CollectorService {
    pub fn new(executions: ExecutionRepository, services: ServiceRepository) -> Self {
        Self {
            executions,
            services,
        }
    }

    pub async fn record(&self, report: ExecutionReport) -> Result<ServiceExecution> {
        if report.service_name.trim().is_empty() {
            return Err(AppError::BadRequest("service_name is required".to_string()));
        }

        self.services
            .get_or_create(&report.service_name, &report.service_type)
            .await?;

        let now = Utc::now();
        let data = &report.execution_data;
        let status = ExecutionOutcome::from_return_code(data.return_code);
        let started_at = data.start_time.unwrap_or(now);
        let completed_at = data.end_time.unwrap_or(now);
        let duration_seconds = data.elapsed_time.or_else(|| {
            (data.start_time.is_some() && data.end_time.is_some())
                .then(|| (completed_at - started_at).num_milliseconds() as f64 / 1000.0)
        });

        let execution = self
            .executions
            .create(NewServiceExecution {
                service_name: report.service_name.clone(),
                service_type: report.service_type.clone(),
                status,
                started_at,
                completed_at: Some(completed_at),
                duration_seconds,
                stdout: data.stdout.clone(),
                stderr: data.stderr.clone(),
                return_code: data.return_code,
                execution_data: serde_json::to_value(data)?,
            })
            .await?;

        self.services
            .record_outcome(&report.service_name, status, started_at)
            .await?;

        tracing::info!(
            "recorded {} execution of {} ({})",
            status_label(status),
            execution.service_name,
            execution.execution_time_display()
        );
        Ok(execution)
    }

    pub async fn get_execution(&self, id: i64) -> Result<ServiceExecution> {
        self.executions.get(id).await
    }

    pub async fn dashboard(&self) -> Result<DashboardData> {
        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let stats = self.executions.stats(midnight).await?;
        let recent_executions = self.executions.list_recent(RECENT_EXECUTIONS).await?;

        let mut services = Vec::new();
        for info in self.services.list().await? {
            let latest = self.executions.latest_for_service(&info.name).await?;
            services.push(ServiceSummary {
                success_rate: info.success_rate(),
                latest_status: latest.as_ref().map(|execution| execution.status),
                latest_execution_time: latest.map(|execution| execution.execution_time_display()),
                info,
            });
        }

        Ok(DashboardData {
            stats,
            recent_executions,
            services,
        })
    }
}

fn status_label(status: ExecutionOutcome) -> &'static str {
    match status {
        ExecutionOutcome::Success => "successful",
        ExecutionOutcome::Failed => "failed",
    }
}
