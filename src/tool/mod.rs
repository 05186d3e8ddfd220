//! External tool invocation
//!
//! Each OpenSim tool is a command-line executable taking a setup file:
//!
//! ```text
//! <tool> -S <setup-file> > <log-file>      (cwd = trial working directory)
//! ```
//!
//! Tools signal nothing through exit codes. Completion means an expected
//! artifact appeared; failure means a marker in the log tail, an early exit,
//! or a timeout. One [`ToolSpec`] per tool carries the poll timing and the
//! completion strategy, and one generic routine ([`ProcessRunner`]) launches
//! and polls every tool.
//!
//! ## Components
//!
//! - [`invoker`]: spawn the tool detached from the caller with output sent to the log
//! - [`poller`]: wait for the artifact, watch the log tail, kill on timeout
//! - `runner`: the [`ToolRunner`] seam the pipeline and RRA controller call

pub mod invoker;
pub mod poller;
mod runner;

pub use runner::{ProcessRunner, ToolReport, ToolRunner};

use crate::config::ToolTiming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The OpenSim tools the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    /// Model scaling
    Scale,
    /// Inverse kinematics
    Ik,
    /// Inverse dynamics
    Id,
    /// Residual reduction
    Rra,
    /// Computed muscle control
    Cmc,
}

impl ToolKind {
    /// Every tool in pipeline order.
    pub const ALL: [Self; 5] = [Self::Scale, Self::Ik, Self::Id, Self::Rra, Self::Cmc];

    /// Executable name.
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Ik => "ik",
            Self::Id => "id",
            Self::Rra => "rra",
            Self::Cmc => "cmc",
        }
    }

    /// Tag used in setup, log and output file names.
    #[must_use]
    pub const fn file_tag(self) -> &'static str {
        match self {
            Self::Scale => "Scale",
            Self::Ik => "IK",
            Self::Id => "ID",
            Self::Rra => "RRA",
            Self::Cmc => "CMC",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_tag())
    }
}

/// Terminal status of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    /// Expected artifact appeared
    Passed,
    /// Failure marker in the log, or the process exited without the artifact
    Failed,
    /// Artifact never appeared within the timeout
    TimedOut,
}

impl ToolStatus {
    /// True only for `Passed`.
    #[must_use]
    pub const fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        })
    }
}

/// A failure marker that counts only inside an elapsed-time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTailRule {
    /// Marker substring
    pub marker: String,
    /// Window opens after this much elapsed time
    pub after: Duration,
    /// Window closes at this much elapsed time (`None` = never)
    pub before: Option<Duration>,
}

impl LogTailRule {
    /// Rule active from `after` onwards.
    #[must_use]
    pub fn new(marker: impl Into<String>, after: Duration) -> Self {
        Self {
            marker: marker.into(),
            after,
            before: None,
        }
    }

    /// Close the window at `before`.
    #[must_use]
    pub const fn until(mut self, before: Duration) -> Self {
        self.before = Some(before);
        self
    }

    /// Whether the rule applies at `elapsed`.
    #[must_use]
    pub fn active_at(&self, elapsed: Duration) -> bool {
        elapsed > self.after && self.before.map_or(true, |before| elapsed < before)
    }
}

/// How completion is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionCheck {
    /// Artifact existence only
    ArtifactExists,
    /// Artifact existence plus failure markers in the last `tail_lines` log lines
    LogTail {
        /// Lines inspected from the end of the log
        tail_lines: usize,
        /// Marker rules
        rules: Vec<LogTailRule>,
    },
}

/// Poll configuration for one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Tool
    pub kind: ToolKind,
    /// Delay between checks
    pub poll_interval: Duration,
    /// Upper bound on the wait
    pub timeout: Duration,
    /// Pause after the artifact appears
    pub settle: Duration,
    /// Completion strategy
    pub completion: CompletionCheck,
}

impl ToolSpec {
    /// Spec for `kind` with the given timing and the tool's completion strategy.
    ///
    /// CMC watches its log: an `exception` between 30 s and 2 min, or
    /// `FAILED` after 10 min, stops the wait early.
    #[must_use]
    pub fn new(kind: ToolKind, timing: &ToolTiming) -> Self {
        let completion = match kind {
            ToolKind::Cmc => CompletionCheck::LogTail {
                tail_lines: 10,
                rules: vec![
                    LogTailRule::new("exception", Duration::from_secs(30))
                        .until(Duration::from_secs(120)),
                    LogTailRule::new("FAILED", Duration::from_secs(600)),
                ],
            },
            _ => CompletionCheck::ArtifactExists,
        };
        Self {
            kind,
            poll_interval: timing.poll_interval(),
            timeout: timing.timeout(),
            settle: timing.settle(),
            completion,
        }
    }

    /// Replace the completion strategy.
    #[must_use]
    pub fn with_completion(mut self, completion: CompletionCheck) -> Self {
        self.completion = completion;
        self
    }
}

/// One launch of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tool
    pub kind: ToolKind,
    /// Trial this run belongs to
    pub trial: String,
    /// Setup file, relative to `working_dir`
    pub setup_file: PathBuf,
    /// Working directory of the child
    pub working_dir: PathBuf,
    /// Log receiving stdout and stderr
    pub log_file: PathBuf,
    /// File whose appearance means completion
    pub artifact: PathBuf,
}

impl ToolInvocation {
    /// Invocation with the conventional log and artifact names inside `working_dir`.
    #[must_use]
    pub fn new(
        kind: ToolKind,
        trial: impl Into<String>,
        setup_file: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        log_name: &str,
        artifact_name: &str,
    ) -> Self {
        let working_dir = working_dir.into();
        Self {
            kind,
            trial: trial.into(),
            setup_file: setup_file.into(),
            log_file: working_dir.join(log_name),
            artifact: working_dir.join(artifact_name),
            working_dir,
        }
    }

    /// Shell rendering of the command, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        format!(
            "{} -S {} > {}",
            self.kind.command(),
            self.setup_file.display(),
            self.log_file.display()
        )
    }

    /// Log path.
    #[must_use]
    pub fn log(&self) -> &Path {
        &self.log_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolTimings;

    #[test]
    fn test_command_tokens() {
        let tokens: Vec<_> = ToolKind::ALL.iter().map(|k| k.command()).collect();
        assert_eq!(tokens, vec!["scale", "ik", "id", "rra", "cmc"]);
    }

    #[test]
    fn test_command_line() {
        let inv = ToolInvocation::new(
            ToolKind::Rra,
            "S1_A_Walk",
            "S1_A_Walk__Setup_RRA.xml",
            "/tmp/S1/S1_A_Walk",
            "S1_A_Walk_RRA.log",
            "S1_A_Walk_RRA_controls.xml",
        );
        assert_eq!(
            inv.command_line(),
            "rra -S S1_A_Walk__Setup_RRA.xml > /tmp/S1/S1_A_Walk/S1_A_Walk_RRA.log"
        );
    }

    #[test]
    fn test_cmc_watches_log_tail() {
        let timings = ToolTimings::default();
        let spec = ToolSpec::new(ToolKind::Cmc, &timings.cmc);
        match spec.completion {
            CompletionCheck::LogTail { tail_lines, rules } => {
                assert_eq!(tail_lines, 10);
                assert_eq!(rules.len(), 2);
                assert!(rules[0].active_at(Duration::from_secs(60)));
                assert!(!rules[0].active_at(Duration::from_secs(200)));
                assert!(!rules[1].active_at(Duration::from_secs(200)));
                assert!(rules[1].active_at(Duration::from_secs(601)));
            }
            CompletionCheck::ArtifactExists => panic!("CMC should inspect its log"),
        }
        let ik = ToolSpec::new(ToolKind::Ik, &timings.ik);
        assert_eq!(ik.completion, CompletionCheck::ArtifactExists);
    }
}
