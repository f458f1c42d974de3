use super::invocation::ParsedInvocation;
use super::report::{ReportClient, append_capture_log};
use crate::config::CaptureConfig;
use crate::executor::exit_code;
use crate::models::{ExecutionData, ExecutionReport};
use chrono::Utc;
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;

/// Exit status a shell uses when a command cannot be executed.
const EXIT_CANNOT_EXECUTE: i32 = 127;

/// Set on a wrapper process started only to post one report.
pub const REPORTER_ENV: &str = "TORERO_CAPTURE_REPORTER";

/// Output of one captured invocation plus the report describing it.
#[derive(Debug)]
pub struct Capture {
    pub return_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub report: ExecutionReport,
}

/// Runs the real binary for `args` and returns the exit code the wrapper must exit with.
pub async fn run(config: &CaptureConfig, args: Vec<OsString>) -> i32 {
    if points_to_self(&config.real_binary) {
        eprintln!(
            "torero-capture: {} resolves to the wrapper itself; set TORERO_REAL_BINARY",
            config.real_binary.display()
        );
        return EXIT_CANNOT_EXECUTE;
    }

    // Non UTF-8 arguments can never match `run service ...`.
    let parsed = args
        .iter()
        .map(|arg| arg.to_str())
        .collect::<Option<Vec<&str>>>()
        .map(|text| ParsedInvocation::parse(&text))
        .unwrap_or(ParsedInvocation::PassThrough);

    if !parsed.is_captured() {
        return pass_through(&config.real_binary, &args);
    }

    let capture = match invoke(&config.real_binary, &args, &parsed).await {
        Ok(capture) => capture,
        Err(e) => {
            eprintln!(
                "torero-capture: failed to execute {}: {}",
                config.real_binary.display(),
                e
            );
            return EXIT_CANNOT_EXECUTE;
        }
    };

    emit(&capture.stdout, &capture.stderr);
    record(config, &capture.report);
    capture.return_code
}

/// Runs the real binary with piped stdout/stderr and inherited stdin, timing it.
pub async fn invoke(
    real_binary: &Path,
    args: &[OsString],
    parsed: &ParsedInvocation,
) -> std::io::Result<Capture> {
    let start_time = Utc::now();
    let clock = Instant::now();

    let output = tokio::process::Command::new(real_binary)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let elapsed_time = clock.elapsed().as_secs_f64();
    let end_time = Utc::now();
    let return_code = exit_code(&output.status);

    let report = ExecutionReport {
        service_name: parsed.service_name().unwrap_or_default().to_string(),
        service_type: parsed.service_type().unwrap_or_default().to_string(),
        operation: parsed.operation().map(str::to_string),
        execution_data: ExecutionData {
            return_code: Some(return_code),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            start_time: Some(start_time),
            end_time: Some(end_time),
            elapsed_time: Some(elapsed_time),
        },
    };

    Ok(Capture {
        return_code,
        stdout: output.stdout,
        stderr: output.stderr,
        report,
    })
}

/// Appends the capture log, then hands the report to a detached reporter so
/// the caller never waits on the collector. Failures are swallowed.
pub fn record(config: &CaptureConfig, report: &ExecutionReport) {
    if let Some(path) = &config.capture_log {
        if let Err(e) = append_capture_log(path, report) {
            tracing::debug!("capture log {} not written: {}", path.display(), e);
        }
    }
    if let Err(e) = spawn_reporter(report) {
        tracing::debug!("report not handed to a reporter: {}", e);
    }
}

/// Starts this binary again in reporter mode with the report on its stdin.
/// The reporter outlives the wrapper and is never waited on.
#[allow(clippy::zombie_processes)]
fn spawn_reporter(report: &ExecutionReport) -> crate::error::Result<()> {
    let body = serde_json::to_vec(report)?;
    let mut reporter = std::process::Command::new(std::env::current_exe()?)
        .env(REPORTER_ENV, "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = reporter.stdin.take() {
        stdin.write_all(&body)?;
    }
    Ok(())
}

/// Reporter mode: reads one report from stdin and posts it.
pub async fn report_from_stdin(config: &CaptureConfig) -> i32 {
    let mut body = Vec::new();
    if tokio::io::stdin().read_to_end(&mut body).await.is_err() {
        return 1;
    }
    match serde_json::from_slice::<ExecutionReport>(&body) {
        Ok(report) => {
            deliver(config, &report).await;
            0
        }
        Err(e) => {
            tracing::debug!("unreadable report: {}", e);
            1
        }
    }
}

/// Posts the report, bounded by the report timeout. Every failure is swallowed.
pub async fn deliver(config: &CaptureConfig, report: &ExecutionReport) {
    let Ok(client) = ReportClient::new(&config.collector_url, config.report_timeout) else {
        return;
    };
    match tokio::time::timeout(config.report_timeout, client.send(report)).await {
        Ok(Ok(())) => tracing::debug!("reported execution to {}", client.endpoint()),
        Ok(Err(e)) => tracing::debug!("report to {} failed: {}", client.endpoint(), e),
        Err(_) => tracing::debug!("report to {} timed out", client.endpoint()),
    }
}

fn emit(stdout: &[u8], stderr: &[u8]) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(stdout);
    let _ = out.flush();
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(stderr);
    let _ = err.flush();
}

#[cfg(unix)]
fn pass_through(real_binary: &Path, args: &[OsString]) -> i32 {
    use std::os::unix::process::CommandExt;

    // Only returns on failure.
    let err = std::process::Command::new(real_binary).args(args).exec();
    eprintln!(
        "torero-capture: failed to execute {}: {}",
        real_binary.display(),
        err
    );
    EXIT_CANNOT_EXECUTE
}

#[cfg(not(unix))]
fn pass_through(real_binary: &Path, args: &[OsString]) -> i32 {
    match std::process::Command::new(real_binary).args(args).status() {
        Ok(status) => exit_code(&status),
        Err(e) => {
            eprintln!(
                "torero-capture: failed to execute {}: {}",
                real_binary.display(),
                e
            );
            EXIT_CANNOT_EXECUTE
        }
    }
}

fn points_to_self(real_binary: &Path) -> bool {
    let (Ok(current), Ok(real)) = (
        std::env::current_exe().and_then(std::fs::canonicalize),
        std::fs::canonicalize(real_binary),
    ) else {
        return false;
    };
    current == real
}
