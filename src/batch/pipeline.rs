//! Per-trial pipeline: IK → ID → RRA → mass iteration → CMC
//!
//! Every stage works in the trial's own working directory. The stage's
//! setup is copied there with its outputs redirected into it, the tool
//! runs, and the outputs are moved up into the subject directory. RRA is
//! the exception: its outputs stay put for the mass iteration, which moves
//! everything up once it ends.

use super::record::{TrialRun, TrialStatus};
use crate::config::PipelineConfig;
use crate::layout::{setup_path, TrialLayout};
use crate::model::{SetupField, SetupFile};
use crate::rra::controller::remove_if_present;
use crate::rra::{IterationOutcome, IterationPaths, RraIterator, RunOutcomeParser};
use crate::tool::{ToolInvocation, ToolKind, ToolReport, ToolRunner, ToolSpec, ToolStatus};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Intermediate model Scale writes before marker placement.
pub const TEMP_SCALED_MODEL: &str = "TempScaled.osim";

/// Console captures some tools leave in their working directory.
const SCRATCH_FILES: [&str; 3] = ["err.log", "out.log", TEMP_SCALED_MODEL];

fn path_string(path: &Path) -> Result<String> {
    Ok(setup_path(path)?)
}

/// Error describing a stage that did not pass.
#[must_use]
pub fn stage_error(report: &ToolReport, kind: ToolKind, trial: &str) -> Error {
    match report.status {
        ToolStatus::TimedOut => Error::ToolTimedOut {
            tool: kind.command().to_string(),
            trial: trial.to_string(),
            elapsed_secs: report.elapsed.as_secs(),
        },
        ToolStatus::Failed | ToolStatus::Passed => Error::ToolFailed {
            tool: kind.command().to_string(),
            trial: trial.to_string(),
            reason: format!("no {} after {}", report.artifact.display(), report.command),
        },
    }
}

/// Runs the stages of one trial.
pub struct TrialPipeline<'a> {
    runner: &'a dyn ToolRunner,
    parser: &'a dyn RunOutcomeParser,
    config: &'a PipelineConfig,
}

impl<'a> TrialPipeline<'a> {
    /// Pipeline running tools through `runner` and reading RRA logs with `parser`.
    #[must_use]
    pub const fn new(
        runner: &'a dyn ToolRunner,
        parser: &'a dyn RunOutcomeParser,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            runner,
            parser,
            config,
        }
    }

    /// Poll spec for `kind` from the configuration.
    #[must_use]
    pub fn spec(&self, kind: ToolKind) -> ToolSpec {
        ToolSpec::new(kind, self.config.tools.get(kind))
    }

    /// Copy the `kind` setup into the working directory with its outputs
    /// redirected there.
    ///
    /// # Errors
    ///
    /// Returns error if the setup is missing, lacks a redirected tag, or
    /// cannot be written
    pub fn stage_setup(&self, layout: &TrialLayout, kind: ToolKind) -> Result<ToolInvocation> {
        let work_dir = layout.working_dir();
        std::fs::create_dir_all(&work_dir)?;
        let artifact = layout.artifact_name(kind);

        let mut setup = SetupFile::load(layout.setup(kind))?;
        match kind {
            ToolKind::Scale => {
                setup.set_field(
                    SetupField::OutputModelFile,
                    0,
                    &path_string(&work_dir.join(TEMP_SCALED_MODEL))?,
                )?;
                setup.set_field(
                    SetupField::OutputModelFile,
                    1,
                    &path_string(&work_dir.join(&artifact))?,
                )?;
            }
            ToolKind::Ik => {
                setup.set_field(
                    SetupField::OutputMotionFile,
                    0,
                    &path_string(&work_dir.join(&artifact))?,
                )?;
            }
            ToolKind::Id => {}
            ToolKind::Rra | ToolKind::Cmc => {
                setup.set_field(SetupField::ResultsDirectory, 0, &path_string(&work_dir)?)?;
                if kind == ToolKind::Rra {
                    setup.set_field(
                        SetupField::OutputModelFile,
                        0,
                        &path_string(&layout.work_file("__AdjustedCOM.osim"))?,
                    )?;
                }
            }
        }
        let setup_name = layout.setup_name(kind);
        setup.save_as(work_dir.join(&setup_name))?;
        debug!(trial = layout.trial(), tool = kind.command(), "setup staged");

        Ok(ToolInvocation::new(
            kind,
            layout.trial(),
            setup_name,
            work_dir,
            &layout.log_name(kind),
            &artifact,
        ))
    }

    /// Run one stage. On success the outputs are moved into the subject
    /// directory, except for RRA whose outputs the mass iteration needs.
    ///
    /// # Errors
    ///
    /// Returns error if the setup cannot be staged, the tool cannot be
    /// started, or the outputs cannot be moved. A tool that fails or times
    /// out is reported through the returned [`ToolReport`].
    pub fn run_stage(&self, layout: &TrialLayout, kind: ToolKind) -> Result<ToolReport> {
        let invocation = self.stage_setup(layout, kind)?;
        let report = self.runner.run(&invocation, &self.spec(kind))?;
        clean_scratch(&layout.working_dir())?;
        if report.status.passed() && kind != ToolKind::Rra {
            remove_if_present(&layout.working_dir().join(layout.setup_name(kind)))?;
            move_results_up(layout)?;
        }
        Ok(report)
    }

    /// Scale the subject's generic model. Runs once per subject.
    ///
    /// # Errors
    ///
    /// Returns error if the stage cannot be staged or its outputs moved
    pub fn scale_subject(&self, subject_dir: &Path, subject: &str) -> Result<ToolReport> {
        let layout = TrialLayout::static_pose(subject_dir, subject);
        let report = self.run_stage(&layout, ToolKind::Scale)?;
        if report.status.passed() {
            info!(subject, "model scaled");
        } else {
            warn!(subject, status = %report.status, "scaling did not pass");
        }
        Ok(report)
    }

    /// Run IK, ID, RRA, the mass iteration and CMC for `layout`'s trial.
    ///
    /// Never fails: errors end the trial as [`TrialStatus::Failed`] with a
    /// message naming the stage.
    #[must_use]
    pub fn run_trial(&self, layout: &TrialLayout) -> TrialRun {
        let trial = layout.trial();
        let mut run = TrialRun::new(trial, layout.subject());
        run.start();
        info!(trial, "trial started");

        match self.drive(layout, &mut run) {
            Ok(()) => {}
            Err((stage, e)) => {
                error!(trial, stage = ?stage, error = %e, "{trial} has failed -- check status manually");
                run.fail(stage, e.to_string());
            }
        }
        info!(trial, status = %run.status(), "trial finished");
        run
    }

    fn drive(
        &self,
        layout: &TrialLayout,
        run: &mut TrialRun,
    ) -> std::result::Result<(), (Option<ToolKind>, Error)> {
        let trial = layout.trial();
        for kind in [ToolKind::Ik, ToolKind::Id, ToolKind::Rra] {
            let report = self
                .run_stage(layout, kind)
                .map_err(|e| (Some(kind), e))?;
            if !report.status.passed() {
                return Err((Some(kind), stage_error(&report, kind, trial)));
            }
        }

        let outcome = self
            .iterate_rra(layout)
            .map_err(|e| (Some(ToolKind::Rra), e))?;
        run.record_iteration(outcome);
        if let IterationOutcome::Failed { iteration, status } = outcome {
            return Err((
                Some(ToolKind::Rra),
                Error::ToolFailed {
                    tool: ToolKind::Rra.command().to_string(),
                    trial: trial.to_string(),
                    reason: format!("mass iteration {iteration} {status}"),
                },
            ));
        }

        if !layout.file("_RRA_Kinematics_q.sto").exists() {
            return Err((
                Some(ToolKind::Cmc),
                Error::Other(format!("{trial}_RRA_Kinematics_q.sto missing, CMC skipped")),
            ));
        }
        let report = self
            .run_stage(layout, ToolKind::Cmc)
            .map_err(|e| (Some(ToolKind::Cmc), e))?;
        if !report.status.passed() {
            return Err((Some(ToolKind::Cmc), stage_error(&report, ToolKind::Cmc, trial)));
        }

        run.complete(if outcome.converged() {
            TrialStatus::Converged
        } else {
            TrialStatus::NotConverged
        });
        Ok(())
    }

    /// Run the mass iteration on the baseline RRA outputs in the working
    /// directory. Unless it failed, the iteration setup is repointed at the
    /// subject directory and every output is moved up.
    ///
    /// # Errors
    ///
    /// Returns the controller's errors, or IO errors while relocating
    pub fn iterate_rra(&self, layout: &TrialLayout) -> Result<IterationOutcome> {
        let paths = IterationPaths::in_working_dir(layout);
        let outcome = RraIterator::new(self.runner, self.parser, self.config).run(&paths)?;
        if !matches!(outcome, IterationOutcome::Failed { .. }) {
            finish_iteration(layout, &paths)?;
        }
        Ok(outcome)
    }
}

/// Remove the tools' scratch files from `work_dir`.
///
/// # Errors
///
/// Returns error if a present file cannot be removed
pub fn clean_scratch(work_dir: &Path) -> Result<()> {
    for name in SCRATCH_FILES {
        remove_if_present(&work_dir.join(name))?;
    }
    Ok(())
}

/// Move every file in the trial's working directory into the subject
/// directory, then remove the working directory.
///
/// # Errors
///
/// Returns error if a file cannot be moved or the directory is not empty
pub fn move_results_up(layout: &TrialLayout) -> Result<Vec<PathBuf>> {
    let work_dir = layout.working_dir();
    let mut moved = Vec::new();
    for entry in std::fs::read_dir(&work_dir)? {
        let entry = entry?;
        let target = layout.subject_dir().join(entry.file_name());
        std::fs::rename(entry.path(), &target)?;
        moved.push(target);
    }
    std::fs::remove_dir(&work_dir)?;
    debug!(trial = layout.trial(), files = moved.len(), "results moved to subject directory");
    Ok(moved)
}

/// Drop the iteration's intermediates, point its setup at the subject
/// directory and move the outputs up.
fn finish_iteration(layout: &TrialLayout, paths: &IterationPaths) -> Result<()> {
    remove_if_present(&paths.adjusted_model())?;
    remove_if_present(&paths.setup())?;
    clean_scratch(paths.dir())?;

    let mut setup = SetupFile::load(paths.iteration_setup())?;
    setup.set_field(
        SetupField::ModelFile,
        0,
        &path_string(&layout.file(".osim"))?,
    )?;
    setup.set_field(
        SetupField::ResultsDirectory,
        0,
        &path_string(layout.subject_dir())?,
    )?;
    setup.set_field(
        SetupField::OutputModelFile,
        0,
        &path_string(&layout.file("__AdjustedCOM.osim"))?,
    )?;
    setup.save()?;

    move_results_up(layout)?;
    Ok(())
}
