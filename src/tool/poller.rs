//! Completion poller
//!
//! Blocks the calling worker until the tool's artifact exists, a failure
//! marker shows up in the log tail, the child exits without producing the
//! artifact, or the timeout elapses. On failure and timeout the child is
//! killed so no orphaned solver keeps running.
//!
//! A stale artifact from an earlier run satisfies the check immediately;
//! remove it before launching.

use super::{CompletionCheck, LogTailRule, ToolSpec, ToolStatus};
use std::io;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A running process the poller can watch and stop.
pub trait Supervised {
    /// Whether the process has already exited.
    ///
    /// # Errors
    ///
    /// Returns error if the process state cannot be queried
    fn has_exited(&mut self) -> io::Result<bool>;

    /// Kill the process and reap it. Killing an exited process is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the kill or wait fails
    fn terminate(&mut self) -> io::Result<()>;
}

impl Supervised for Child {
    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.try_wait()?.is_some())
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.kill() {
            Ok(()) => {}
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.wait().map(|_| ())
    }
}

/// Last `n` lines of `log`, oldest first. A missing log has no lines.
#[must_use]
pub fn log_tail(log: &Path, n: usize) -> Vec<String> {
    let Ok(bytes) = std::fs::read(log) else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let mut tail: Vec<String> = text.lines().rev().take(n).map(str::to_string).collect();
    tail.reverse();
    tail
}

/// First rule active at `elapsed` whose marker appears in the log tail.
fn failure_marker<'a>(
    log: &Path,
    tail_lines: usize,
    rules: &'a [LogTailRule],
    elapsed: Duration,
) -> Option<&'a LogTailRule> {
    let active: Vec<&LogTailRule> = rules.iter().filter(|r| r.active_at(elapsed)).collect();
    if active.is_empty() {
        return None;
    }
    let tail = log_tail(log, tail_lines);
    active
        .into_iter()
        .find(|rule| tail.iter().any(|line| line.contains(&rule.marker)))
}

fn stop(process: &mut Option<&mut dyn Supervised>) {
    if let Some(p) = process.as_mut() {
        if let Err(e) = p.terminate() {
            warn!(error = %e, "could not terminate tool process");
        }
    }
}

/// Wait for the tool described by `spec` to finish.
///
/// `process` is the launched child, if any; without one only the artifact,
/// the log and the clock are watched.
pub fn wait_for_completion(
    spec: &ToolSpec,
    artifact: &Path,
    log: &Path,
    mut process: Option<&mut dyn Supervised>,
) -> ToolStatus {
    let start = Instant::now();
    loop {
        if artifact.exists() {
            thread::sleep(spec.settle);
            return ToolStatus::Passed;
        }

        let elapsed = start.elapsed();
        if elapsed >= spec.timeout {
            debug!(tool = spec.kind.command(), ?elapsed, "timed out");
            stop(&mut process);
            return ToolStatus::TimedOut;
        }

        if let CompletionCheck::LogTail { tail_lines, rules } = &spec.completion {
            if let Some(rule) = failure_marker(log, *tail_lines, rules, elapsed) {
                warn!(
                    tool = spec.kind.command(),
                    marker = %rule.marker,
                    log = %log.display(),
                    "failure marker in log tail"
                );
                stop(&mut process);
                return ToolStatus::Failed;
            }
        }

        if let Some(p) = process.as_mut() {
            match p.has_exited() {
                Ok(true) => {
                    // The artifact may land just before exit.
                    if artifact.exists() {
                        thread::sleep(spec.settle);
                        return ToolStatus::Passed;
                    }
                    warn!(tool = spec.kind.command(), "exited without writing its artifact");
                    return ToolStatus::Failed;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "cannot query tool process"),
            }
        }

        thread::sleep(spec.poll_interval.min(spec.timeout - elapsed));
    }
}
