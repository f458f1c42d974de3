use super::{CommandOutput, ServiceExecutor};
use crate::error::{AppError, Result};
use crate::inputs::InputResolver;
use crate::models::{QueueItem, ServiceType};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

/// Invokes the `torero` binary (or the capture wrapper standing in for it).
#[derive(Clone)]
pub struct ToreroExecutor {
    torero_command: PathBuf,
    resolver: InputResolver,
    cli_timeout: Duration,
}

impl ToreroExecutor {
    pub fn new(torero_command: PathBuf, resolver: InputResolver, cli_timeout: Duration) -> Self {
        Self {
            torero_command,
            resolver,
            cli_timeout,
        }
    }

    /// `run service <type> [<operation>] <name> <input flags> --raw`
    pub fn build_args(&self, item: &QueueItem) -> Result<Vec<String>> {
        let mut args = vec![
            "run".to_string(),
            "service".to_string(),
            item.service_type.as_str().to_string(),
        ];
        if item.service_type == ServiceType::OpentofuPlan {
            args.push(item.operation.unwrap_or_default().as_str().to_string());
        }
        args.push(item.service_name.clone());

        if !item.inputs.is_empty() || item.input_file.is_some() {
            let resolved = self
                .resolver
                .resolve_inputs(Some(&item.inputs), item.input_file.as_deref())?;
            args.extend(self.resolver.to_cli_args(item.service_type, &resolved));
        }

        args.push("--raw".to_string());
        Ok(args)
    }

    /// Runs a read-only query such as `get services` and parses its JSON output.
    pub async fn query_json(&self, args: &[&str]) -> Result<Value> {
        let mut cmd = tokio::process::Command::new(&self.torero_command);
        cmd.args(args)
            .arg("--raw")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.cli_timeout, cmd.output())
            .await
            .map_err(|_| AppError::Timeout(self.cli_timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                "torero {} failed with {:?}: {}",
                args.join(" "),
                output.status.code(),
                stderr.trim()
            );
            return Err(AppError::Execution(format!(
                "torero {} exited with {:?}",
                args.join(" "),
                output.status.code()
            )));
        }

        let value = serde_json::from_slice(&output.stdout).map_err(|e| {
            tracing::warn!("failed to parse json from torero {}: {}", args.join(" "), e);
            AppError::Execution(format!("invalid JSON from torero {}: {}", args.join(" "), e))
        })?;
        Ok(value)
    }
}

impl ServiceExecutor for ToreroExecutor {
    async fn execute(&self, item: &QueueItem) -> Result<CommandOutput> {
        let args = self.build_args(item)?;
        tracing::info!(
            "executing torero command: {} {}",
            self.torero_command.display(),
            args.join(" ")
        );

        let mut cmd = tokio::process::Command::new(&self.torero_command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The capture wrapper starts the real binary as its own child; a
        // group of its own lets an abandoned run take both down.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            AppError::Execution(format!(
                "failed to start {}: {}",
                self.torero_command.display(),
                e
            ))
        })?;
        let mut group = ProcessGroup::of(&child);

        let output = child.wait_with_output().await.map_err(|e| {
            AppError::Execution(format!(
                "failed to wait for {}: {}",
                self.torero_command.display(),
                e
            ))
        })?;
        group.release();

        Ok(CommandOutput {
            return_code: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Kills the whole process group of a child when dropped, unless released.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    id: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &tokio::process::Child) -> Self {
        Self { id: child.id() }
    }

    /// The child exited on its own; whatever it left behind may keep running.
    fn release(&mut self) {
        self.id = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.id.take().and_then(|id| i32::try_from(id).ok()) {
            // SAFETY: kill(2) takes plain integers and touches no memory of ours.
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc == 0 {
                tracing::warn!("killed process group {} of an abandoned execution", pgid);
            }
        }
    }
}

/// Exit code as a shell reports it: `128 + signal` for signal-terminated children.
pub fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
