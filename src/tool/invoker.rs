//! External tool invoker
//!
//! Starts the tool as a child process and returns at once. The caller owns
//! the `Child` and is responsible for detecting completion (see
//! [`poller`](super::poller)). A single call is a single attempt.

use super::ToolInvocation;
use crate::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Resolve the executable for the invocation's tool.
///
/// With a tool directory the executable is looked up there; otherwise the
/// bare command name is handed to the OS and resolved through `PATH`.
#[must_use]
pub fn executable(tool_dir: Option<&Path>, invocation: &ToolInvocation) -> PathBuf {
    let command = invocation.kind.command();
    tool_dir.map_or_else(|| PathBuf::from(command), |dir| dir.join(command))
}

/// Launch `invocation`, truncating its log and sending stdout and stderr there.
///
/// # Errors
///
/// Returns error if the log cannot be created or the process cannot be spawned
pub fn launch(tool_dir: Option<&Path>, invocation: &ToolInvocation) -> Result<Child> {
    let log = File::create(&invocation.log_file)?;
    let err_log = log.try_clone()?;
    let program = executable(tool_dir, invocation);

    debug!(
        trial = %invocation.trial,
        tool = invocation.kind.command(),
        command = %invocation.command_line(),
        "launching tool"
    );

    Command::new(&program)
        .arg("-S")
        .arg(&invocation.setup_file)
        .current_dir(&invocation.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log))
        .spawn()
        .map_err(|e| Error::ToolFailed {
            tool: invocation.kind.command().to_string(),
            trial: invocation.trial.clone(),
            reason: format!("cannot start {}: {e}", program.display()),
        })
}
