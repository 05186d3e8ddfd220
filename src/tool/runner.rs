//! Tool runner - launch, poll and report one invocation

use super::poller::{self, Supervised};
use super::{invoker, ToolInvocation, ToolSpec, ToolStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What happened to one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReport {
    /// Rendered command line
    pub command: String,
    /// Working directory
    pub working_dir: PathBuf,
    /// Log file
    pub log_file: PathBuf,
    /// Expected artifact
    pub artifact: PathBuf,
    /// Launch time
    pub started_at: DateTime<Utc>,
    /// Wall-clock time until the terminal status
    pub elapsed: Duration,
    /// Terminal status
    pub status: ToolStatus,
}

impl ToolReport {
    /// Report for `invocation` ending with `status`.
    #[must_use]
    pub fn new(
        invocation: &ToolInvocation,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        status: ToolStatus,
    ) -> Self {
        Self {
            command: invocation.command_line(),
            working_dir: invocation.working_dir.clone(),
            log_file: invocation.log_file.clone(),
            artifact: invocation.artifact.clone(),
            started_at,
            elapsed,
            status,
        }
    }
}

/// Runs an external tool to a terminal status.
///
/// The production implementation is [`ProcessRunner`]; tests substitute a
/// runner that writes canned logs and artifacts.
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` and block until it passes, fails or times out.
    ///
    /// # Errors
    ///
    /// Returns error only when the tool could not be started at all
    fn run(&self, invocation: &ToolInvocation, spec: &ToolSpec) -> Result<ToolReport>;
}

/// Spawns the real executables.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    tool_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// Runner resolving executables through `PATH`.
    #[must_use]
    pub const fn new() -> Self {
        Self { tool_dir: None }
    }

    /// Runner resolving executables inside `tool_dir`.
    #[must_use]
    pub fn with_tool_dir(tool_dir: Option<PathBuf>) -> Self {
        Self { tool_dir }
    }
}

/// Wait for `child` on a detached thread and log how it exited.
fn reap_in_background(
    mut child: Child,
    trial: String,
    tool: &'static str,
) -> JoinHandle<Option<ExitStatus>> {
    std::thread::spawn(move || match child.wait() {
        Ok(exit) if exit.success() => {
            debug!(trial = %trial, tool, "tool exited");
            Some(exit)
        }
        Ok(exit) => {
            warn!(trial = %trial, tool, %exit, "tool exited unsuccessfully after its artifact appeared");
            Some(exit)
        }
        Err(e) => {
            warn!(trial = %trial, tool, error = %e, "could not reap tool process");
            None
        }
    })
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation, spec: &ToolSpec) -> Result<ToolReport> {
        // A leftover artifact would read as instant success.
        match std::fs::remove_file(&invocation.artifact) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut child = invoker::launch(self.tool_dir.as_deref(), invocation)?;
        let status = poller::wait_for_completion(
            spec,
            &invocation.artifact,
            &invocation.log_file,
            Some(&mut child as &mut dyn Supervised),
        );
        let elapsed = start.elapsed();

        if status.passed() {
            // The tool may still be flushing after the artifact.
            reap_in_background(child, invocation.trial.clone(), invocation.kind.command());
        }

        match status {
            ToolStatus::Passed => info!(
                trial = %invocation.trial,
                tool = invocation.kind.command(),
                elapsed_secs = elapsed.as_secs(),
                "tool finished"
            ),
            ToolStatus::Failed | ToolStatus::TimedOut => warn!(
                trial = %invocation.trial,
                tool = invocation.kind.command(),
                %status,
                elapsed_secs = elapsed.as_secs(),
                "check status of {}_{} manually",
                invocation.trial,
                invocation.kind
            ),
        }

        Ok(ToolReport::new(invocation, started_at, elapsed, status))
    }
}
