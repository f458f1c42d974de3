use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 8001;
const DEFAULT_CLI_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 900;
const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_UI_URL: &str = "http://localhost:8001";
const DEFAULT_REPORT_TIMEOUT_MS: u64 = 2000;
const RECORD_EXECUTION_PATH: &str = "/api/record-execution/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub torero_command: PathBuf,
    pub cli_timeout_secs: u64,
    pub execution_timeout_secs: u64,
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir(crate::paths::data_dir())
    }
}

impl Config {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let database_url = format!(
            "sqlite:{}",
            crate::paths::default_database_path(&data_dir).display()
        );
        Self {
            data_dir,
            database_url,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            torero_command: PathBuf::from("torero"),
            cli_timeout_secs: DEFAULT_CLI_TIMEOUT_SECS,
            execution_timeout_secs: DEFAULT_EXECUTION_TIMEOUT_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let config_path = std::env::var("TORERO_UI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::paths::default_config_path(&config.data_dir));
        if let Some(file_config) = Self::from_conf_file(&config_path)? {
            config.apply_file(file_config);
        }

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse().unwrap_or(DEFAULT_PORT);
        }

        if let Ok(command) = std::env::var("TORERO_COMMAND") {
            config.torero_command = PathBuf::from(command);
        }

        if let Ok(timeout) = std::env::var("TORERO_CLI_TIMEOUT") {
            config.cli_timeout_secs = timeout.parse().unwrap_or(DEFAULT_CLI_TIMEOUT_SECS);
        }

        if let Ok(timeout) = std::env::var("TORERO_EXECUTION_TIMEOUT") {
            config.execution_timeout_secs =
                timeout.parse().unwrap_or(DEFAULT_EXECUTION_TIMEOUT_SECS);
        }

        if let Ok(limit) = std::env::var("QUEUE_HISTORY_LIMIT") {
            config.history_limit = limit.parse().unwrap_or(DEFAULT_HISTORY_LIMIT);
        }

        config.normalize()?;
        Ok(config)
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_secs(self.cli_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Path of the SQLite file, if the database is file-backed.
    pub fn database_path(&self) -> Option<&Path> {
        self.database_url
            .strip_prefix("sqlite:")
            .filter(|path| !path.starts_with(":memory:"))
            .map(Path::new)
    }

    fn from_conf_file(path: &Path) -> Result<Option<FileConfig>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(file_config))
    }

    fn apply_file(&mut self, file_config: FileConfig) {
        if let Some(database_url) = file_config.database_url {
            self.database_url = database_url;
        }
        if let Some(host) = file_config.host {
            self.host = host;
        }
        if let Some(port) = file_config.port {
            self.port = port;
        }
        if let Some(command) = file_config.torero_command {
            self.torero_command = PathBuf::from(command);
        }
        if let Some(timeout) = file_config.cli_timeout_secs {
            self.cli_timeout_secs = timeout;
        }
        if let Some(timeout) = file_config.execution_timeout_secs {
            self.execution_timeout_secs = timeout;
        }
        if let Some(limit) = file_config.history_limit {
            self.history_limit = limit;
        }
    }

    fn normalize(&mut self) -> Result<()> {
        if self.history_limit == 0 {
            anyhow::bail!("history_limit must be at least 1");
        }
        if self.execution_timeout_secs == 0 {
            anyhow::bail!("execution_timeout_secs must be at least 1");
        }
        self.normalize_database_url()
    }

    fn normalize_database_url(&mut self) -> Result<()> {
        let Some(path_str) = self.database_url.strip_prefix("sqlite:") else {
            return Ok(());
        };
        if path_str.starts_with(":memory:") {
            return Ok(());
        }

        let path = Path::new(path_str);
        if path.is_absolute() {
            return Ok(());
        }

        if path
            .components()
            .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            anyhow::bail!("SQLite database path cannot contain '..'");
        }

        let absolute = self.data_dir.join(path);
        self.database_url = format!("sqlite:{}", absolute.display());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    torero_command: Option<String>,
    cli_timeout_secs: Option<u64>,
    execution_timeout_secs: Option<u64>,
    history_limit: Option<usize>,
}

/// Settings for the `torero-capture` wrapper. Environment only: the wrapper
/// must start fast and never fail on a bad config file.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub real_binary: PathBuf,
    pub collector_url: String,
    pub report_timeout: Duration,
    pub capture_log: Option<PathBuf>,
}

impl CaptureConfig {
    pub fn from_env() -> Self {
        let real_binary = std::env::var("TORERO_REAL_BINARY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| installed_real_binary());

        let base_url = std::env::var("TORERO_UI_URL").unwrap_or_else(|_| DEFAULT_UI_URL.into());

        let report_timeout = std::env::var("TORERO_CAPTURE_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse().ok())
            .unwrap_or(DEFAULT_REPORT_TIMEOUT_MS);

        let capture_log = std::env::var("TORERO_CAPTURE_LOG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Self {
            real_binary,
            collector_url: collector_endpoint(&base_url),
            report_timeout: Duration::from_millis(report_timeout),
            capture_log,
        }
    }
}

/// The original kept beside the running wrapper, wherever it was installed.
fn installed_real_binary() -> PathBuf {
    match std::env::current_exe() {
        Ok(exe) => crate::capture::WrapperInstall::new(exe).real_binary(),
        Err(_) => crate::paths::default_real_binary(),
    }
}

pub fn collector_endpoint(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), RECORD_EXECUTION_PATH)
}
