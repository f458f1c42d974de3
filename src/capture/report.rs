use crate::error::Result;
use crate::models::ExecutionReport;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Posts capture reports to the dashboard collector.
#[derive(Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ReportClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn send(&self, report: &ExecutionReport) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Appends the report as one JSON line.
pub fn append_capture_log(path: &Path, report: &ExecutionReport) -> Result<()> {
    let mut line = serde_json::to_vec(report)?;
    line.push(b'\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(&line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionData;

    fn report(name: &str) -> ExecutionReport {
        ExecutionReport {
            service_name: name.into(),
            service_type: "python-script".into(),
            operation: None,
            execution_data: ExecutionData {
                return_code: Some(0),
                stdout: "line\n".into(),
                stderr: String::new(),
                start_time: None,
                end_time: None,
                elapsed_time: Some(1.5),
            },
        }
    }

    #[test]
    fn capture_log_holds_one_report_per_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("captures.log");
        append_capture_log(&path, &report("a")).unwrap();
        append_capture_log(&path, &report("b")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let names: Vec<String> = content
            .lines()
            .map(|line| serde_json::from_str::<ExecutionReport>(line).unwrap().service_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unreachable_collector_is_an_error_not_a_hang() {
        let client =
            ReportClient::new("http://127.0.0.1:9/api/record-execution/", Duration::from_millis(500))
                .unwrap();
        assert!(client.send(&report("a")).await.is_err());
    }
}
