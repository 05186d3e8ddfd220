//! Trial run record - lifecycle of one trial through the pipeline

use crate::rra::IterationOutcome;
use crate::tool::ToolKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Queued, not yet started
    Pending,
    /// Pipeline executing
    Running,
    /// Every stage ran and the RRA mass iteration converged
    Converged,
    /// Every stage ran but the iteration budget was spent first
    NotConverged,
    /// A stage failed, timed out or errored; needs manual inspection
    Failed,
}

impl TrialStatus {
    /// True once the trial can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::NotConverged | Self::Failed)
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Converged => "converged",
            Self::NotConverged => "not-converged",
            Self::Failed => "failed",
        })
    }
}

/// Record of one trial's pass through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRun {
    trial: String,
    subject: String,
    status: TrialStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    failed_stage: Option<ToolKind>,
    iteration: Option<IterationOutcome>,
    message: Option<String>,
}

impl TrialRun {
    /// A pending record for `trial` of `subject`.
    #[must_use]
    pub fn new(trial: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            trial: trial.into(),
            subject: subject.into(),
            status: TrialStatus::Pending,
            started_at: None,
            ended_at: None,
            failed_stage: None,
            iteration: None,
            message: None,
        }
    }

    /// Trial name.
    #[must_use]
    pub fn trial(&self) -> &str {
        &self.trial
    }

    /// Subject id.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Start timestamp, once started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// End timestamp, once finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Stage that failed, if any.
    #[must_use]
    pub const fn failed_stage(&self) -> Option<ToolKind> {
        self.failed_stage
    }

    /// How the RRA mass iteration ended, if it ran.
    #[must_use]
    pub const fn iteration(&self) -> Option<IterationOutcome> {
        self.iteration
    }

    /// Diagnostic message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Pending → Running.
    pub fn start(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the mass iteration's outcome.
    pub fn record_iteration(&mut self, outcome: IterationOutcome) {
        self.iteration = Some(outcome);
    }

    /// Finish with `status`.
    pub fn complete(&mut self, status: TrialStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Finish as failed at `stage` with a message for the operator.
    pub fn fail(&mut self, stage: Option<ToolKind>, message: impl Into<String>) {
        self.failed_stage = stage;
        self.message = Some(message.into());
        self.complete(TrialStatus::Failed);
    }
}
