use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum ServiceType {
    AnsiblePlaybook,
    PythonScript,
    OpentofuPlan,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnsiblePlaybook => "ansible-playbook",
            Self::PythonScript => "python-script",
            Self::OpentofuPlan => "opentofu-plan",
        }
    }

    /// Only opentofu plans take an apply/destroy operation before the name.
    pub fn takes_operation(&self) -> bool {
        matches!(self, Self::OpentofuPlan)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ansible-playbook" => Ok(Self::AnsiblePlaybook),
            "python-script" => Ok(Self::PythonScript),
            "opentofu-plan" => Ok(Self::OpentofuPlan),
            other => Err(AppError::UnsupportedServiceType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Apply,
    Destroy,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(Self::Apply),
            "destroy" => Ok(Self::Destroy),
            other => Err(AppError::BadRequest(format!(
                "unknown operation '{}', expected apply or destroy",
                other
            ))),
        }
    }
}

/// A service known to the dashboard, with its execution statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub service_type: String,
    pub description: String,
    pub tags: Vec<String>,
    pub repository: String,
    pub config_data: Value,
    pub last_execution: Option<DateTime<Utc>>,
    pub total_executions: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceInfo {
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_executions as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_round_trips_through_cli_names() {
        for ty in [
            ServiceType::AnsiblePlaybook,
            ServiceType::PythonScript,
            ServiceType::OpentofuPlan,
        ] {
            assert_eq!(ty.as_str().parse::<ServiceType>().unwrap(), ty);
        }
        assert!(matches!(
            "bash-script".parse::<ServiceType>(),
            Err(AppError::UnsupportedServiceType(_))
        ));
    }

    #[test]
    fn only_opentofu_takes_operation() {
        assert!(ServiceType::OpentofuPlan.takes_operation());
        assert!(!ServiceType::PythonScript.takes_operation());
        assert_eq!(Operation::default(), Operation::Apply);
        assert!("plan".parse::<Operation>().is_err());
    }

    #[test]
    fn success_rate_handles_no_executions() {
        let now = Utc::now();
        let mut info = ServiceInfo {
            name: "hello".into(),
            service_type: "python-script".into(),
            description: String::new(),
            tags: Vec::new(),
            repository: String::new(),
            config_data: Value::Null,
            last_execution: None,
            total_executions: 0,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(info.success_rate(), 0.0);
        info.total_executions = 4;
        info.success_count = 3;
        assert_eq!(info.success_rate(), 75.0);
    }
}
