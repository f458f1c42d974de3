use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result recorded for a captured execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Success,
    Failed,
}

impl ExecutionOutcome {
    pub fn from_return_code(code: Option<i32>) -> Self {
        if code == Some(0) {
            Self::Success
        } else {
            Self::Failed
        }
    }
}

/// One execution of a service as seen by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceExecution {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
}

impl ServiceExecution {
    pub fn execution_time_display(&self) -> String {
        match self.duration_seconds {
            Some(seconds) => format!("{:.2}s", seconds),
            None => "N/A".to_string(),
        }
    }
}

/// Body posted to the collector by the capture wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub service_name: String,
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub execution_data: ExecutionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionData {
    pub return_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, with = "micros")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "micros")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
}

/// RFC 3339 UTC timestamps with exactly six fractional digits.
mod micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.filter(|s| !s.trim().is_empty())
            .map(|s| {
                DateTime::parse_from_rfc3339(s.trim())
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
