//! The `torero-capture` wrapper.
//!
//! Installed in place of the `torero` binary, it times and captures every
//! `run service` invocation, reproduces the real binary's stdout, stderr and
//! exit code unchanged, and leaves reporting to the collector to a detached
//! copy of itself.
//! Everything else is handed straight to the real binary.

mod install;
mod invocation;
mod report;
mod wrapper;

pub use install::{InstallOutcome, UninstallOutcome, WrapperInstall};
pub use invocation::ParsedInvocation;
pub use report::{ReportClient, append_capture_log};
pub use wrapper::{Capture, REPORTER_ENV, deliver, invoke, record, report_from_stdin, run};
