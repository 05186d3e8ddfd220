//! Batch driver
//!
//! Fans a subject's trials out over a fixed-size worker pool. Trials are
//! independent: each owns its working directory, and a failed trial never
//! stops its siblings. Results come back from the parallel map itself and
//! are tallied in a [`BatchSummary`].
//!
//! ```text
//! subject ─▶ Scale ─▶ par_iter(trials) ─▶ [IK → ID → RRA → iterate → CMC, settle] ─▶ relabel .mot
//! ```

pub mod pipeline;
pub mod record;
pub mod rerun;

pub use pipeline::TrialPipeline;
pub use record::{TrialRun, TrialStatus};
pub use rerun::{plan_cmc_rerun, RerunDecision};

use crate::config::PipelineConfig;
use crate::layout::{discover_trials, TrialLayout};
use crate::motfile;
use crate::rra::RunOutcomeParser;
use crate::tool::{ToolKind, ToolRunner};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

/// Per-status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Converged trials
    pub converged: usize,
    /// Trials that ran out of iteration budget
    pub not_converged: usize,
    /// Failed trials
    pub failed: usize,
}

/// Every trial record of a batch plus its tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch start
    pub started_at: DateTime<Utc>,
    /// Batch end
    pub ended_at: DateTime<Utc>,
    /// Trial records, in trial order per subject
    pub runs: Vec<TrialRun>,
}

impl BatchSummary {
    /// Counts by terminal status.
    #[must_use]
    pub fn tally(&self) -> Tally {
        self.runs.iter().fold(Tally::default(), |mut t, run| {
            match run.status() {
                TrialStatus::Converged => t.converged += 1,
                TrialStatus::NotConverged => t.not_converged += 1,
                TrialStatus::Failed | TrialStatus::Pending | TrialStatus::Running => t.failed += 1,
            }
            t
        })
    }

    /// True when every trial converged.
    #[must_use]
    pub fn all_converged(&self) -> bool {
        self.runs
            .iter()
            .all(|run| run.status() == TrialStatus::Converged)
    }

    /// Trials that need manual inspection.
    #[must_use]
    pub fn failures(&self) -> Vec<&TrialRun> {
        self.runs
            .iter()
            .filter(|run| run.status() == TrialStatus::Failed)
            .collect()
    }

    /// JSON rendering for archiving next to the results.
    ///
    /// # Errors
    ///
    /// Returns `Other` if serialization fails
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(format!("{e}")))
    }
}

/// Runs whole subjects.
pub struct BatchDriver<'a> {
    pipeline: TrialPipeline<'a>,
    config: &'a PipelineConfig,
}

impl<'a> BatchDriver<'a> {
    /// Driver running tools through `runner` and parsing RRA logs with `parser`.
    #[must_use]
    pub const fn new(
        runner: &'a dyn ToolRunner,
        parser: &'a dyn RunOutcomeParser,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            pipeline: TrialPipeline::new(runner, parser, config),
            config,
        }
    }

    /// The per-trial pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &TrialPipeline<'a> {
        &self.pipeline
    }

    /// Run `trials` of the subject in `subject_dir` on the worker pool.
    ///
    /// Records come back in the order of `trials`.
    ///
    /// # Errors
    ///
    /// Returns `Other` if the worker pool cannot be built
    pub fn run_trials(&self, subject_dir: &Path, trials: &[String]) -> Result<Vec<TrialRun>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| Error::Other(format!("worker pool: {e}")))?;
        let settle = self.config.settle_delay();
        Ok(pool.install(|| {
            trials
                .par_iter()
                .map(|trial| {
                    let run = self.pipeline.run_trial(&TrialLayout::new(subject_dir, trial.as_str()));
                    std::thread::sleep(settle);
                    run
                })
                .collect()
        }))
    }

    /// Scale, then run every trial of `subject`, then relabel its `.mot` files.
    ///
    /// A failed scale fails every trial of the subject without running it.
    ///
    /// # Errors
    ///
    /// Returns error if the subject directory cannot be listed or the
    /// worker pool cannot be built
    pub fn run_subject(&self, subject: &str) -> Result<Vec<TrialRun>> {
        let subject_dir = self.config.subject_dir(subject);
        let trials = discover_trials(&subject_dir, subject)?;
        info!(subject, trials = trials.len(), "subject started");

        let scale_failure = match self.pipeline.scale_subject(&subject_dir, subject) {
            Ok(report) if report.status.passed() => None,
            Ok(report) => Some(
                pipeline::stage_error(&report, ToolKind::Scale, &format!("{subject}_0_StaticPose"))
                    .to_string(),
            ),
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = scale_failure {
            error!(subject, %message, "scaling failed, skipping trials");
            return Ok(trials
                .iter()
                .map(|trial| {
                    let mut run = TrialRun::new(trial.as_str(), subject);
                    run.fail(Some(ToolKind::Scale), message.clone());
                    run
                })
                .collect());
        }

        let runs = self.run_trials(&subject_dir, &trials)?;
        match motfile::relabel_subject(&subject_dir) {
            Ok(files) => info!(subject, files = files.len(), "motion files relabelled"),
            Err(e) => warn!(subject, error = %e, "motion files not relabelled"),
        }
        info!(subject, "{subject} is finished");
        Ok(runs)
    }

    /// Run every subject in turn.
    ///
    /// A subject whose directory cannot be listed is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the worker pool cannot be built
    pub fn run_subjects<S: AsRef<str>>(&self, subjects: &[S]) -> Result<BatchSummary> {
        let started_at = Utc::now();
        let mut runs = Vec::new();
        for subject in subjects {
            let subject = subject.as_ref();
            match self.run_subject(subject) {
                Ok(subject_runs) => runs.extend(subject_runs),
                Err(Error::Io(e)) => warn!(subject, error = %e, "subject skipped"),
                Err(e) => return Err(e),
            }
        }
        let summary = BatchSummary {
            started_at,
            ended_at: Utc::now(),
            runs,
        };
        let tally = summary.tally();
        info!(
            converged = tally.converged,
            not_converged = tally.not_converged,
            failed = tally.failed,
            "batch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(statuses: &[TrialStatus]) -> BatchSummary {
        let runs = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut run = TrialRun::new(format!("S1_T{i}"), "S1");
                run.start();
                run.complete(*status);
                run
            })
            .collect();
        BatchSummary {
            started_at: Utc::now(),
            ended_at: Utc::now(),
            runs,
        }
    }

    #[test]
    fn test_tally() {
        let s = summary(&[
            TrialStatus::Converged,
            TrialStatus::Failed,
            TrialStatus::NotConverged,
            TrialStatus::Converged,
        ]);
        assert_eq!(
            s.tally(),
            Tally {
                converged: 2,
                not_converged: 1,
                failed: 1
            }
        );
        assert!(!s.all_converged());
        assert_eq!(s.failures()[0].trial(), "S1_T1");
    }

    #[test]
    fn test_summary_json() {
        let s = summary(&[TrialStatus::Converged]);
        let json = s.to_json().unwrap();
        assert!(json.contains("\"Converged\""));
        assert!(s.all_converged());
    }
}
