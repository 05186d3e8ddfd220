//! RRA mass-adjustment convergence controller
//!
//! ```text
//! INIT ─▶ RECORD ─▶ ADJUST ─▶ RUN ─┬─ passed ─▶ |Δm| > tol and budget left ─▶ RECORD ...
//!                                  │            |Δm| ≤ tol  ─▶ Converged
//!                                  │            budget spent ─▶ NotConverged
//!                                  └─ failed / timed-out ─▶ Failed
//! ```
//!
//! Every record documents the run before it; iteration 0 is the baseline
//! RRA run that produced the first recommendation. The adjusted model is
//! owned by this controller for the whole loop.

use super::log::{self, RunOutcomeParser};
use super::report::{IterationRecord, IterationReport, ReportLayout};
use super::stats;
use crate::config::{IterationConfig, PipelineConfig};
use crate::layout::{setup_path, TrialLayout, DYNAMICS_OUTPUTS};
use crate::model::{ModelFile, SetupField, SetupFile};
use crate::storage::{DataTable, TableKind};
use crate::tool::{ToolInvocation, ToolKind, ToolRunner, ToolSpec, ToolStatus};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Files the controller reads and writes, all inside one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPaths {
    dir: PathBuf,
    trial: String,
}

impl IterationPaths {
    /// Paths for `trial` inside `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, trial: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            trial: trial.into(),
        }
    }

    /// Paths inside the trial's working directory.
    #[must_use]
    pub fn in_working_dir(layout: &TrialLayout) -> Self {
        Self::new(layout.working_dir(), layout.trial())
    }

    /// Directory holding every file below.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Trial name.
    #[must_use]
    pub fn trial(&self) -> &str {
        &self.trial
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}", self.trial))
    }

    /// RRA setup the iteration setup is derived from.
    #[must_use]
    pub fn setup(&self) -> PathBuf {
        self.file("__Setup_RRA.xml")
    }

    /// Setup the iterations run with.
    #[must_use]
    pub fn iteration_setup(&self) -> PathBuf {
        self.file("__Setup_RRA_Iterations.xml")
    }

    /// Model each iteration simulates.
    #[must_use]
    pub fn model(&self) -> PathBuf {
        self.file(".osim")
    }

    /// Model RRA writes with its recommended COM.
    #[must_use]
    pub fn adjusted_model(&self) -> PathBuf {
        self.file("__AdjustedCOM.osim")
    }

    /// Console log.
    #[must_use]
    pub fn log(&self) -> PathBuf {
        self.file("_RRA.log")
    }

    /// Iteration report.
    #[must_use]
    pub fn report(&self) -> PathBuf {
        self.file("_RRA__Iterations.data")
    }

    /// Residual actuation output.
    #[must_use]
    pub fn actuation_force(&self) -> PathBuf {
        self.file("_RRA_Actuation_force.sto")
    }

    /// Position-error output.
    #[must_use]
    pub fn position_errors(&self) -> PathBuf {
        self.file("_RRA_pErr.sto")
    }

    /// Output whose appearance means a run finished.
    #[must_use]
    pub fn artifact(&self) -> PathBuf {
        self.file("_RRA_controls.xml")
    }

    /// Invocation running the iteration setup.
    #[must_use]
    pub fn invocation(&self) -> ToolInvocation {
        ToolInvocation::new(
            ToolKind::Rra,
            self.trial.clone(),
            format!("{}__Setup_RRA_Iterations.xml", self.trial),
            self.dir.clone(),
            &format!("{}_RRA.log", self.trial),
            &format!("{}_RRA_controls.xml", self.trial),
        )
    }

    /// Stale outputs removed before each run.
    fn stale_outputs(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.log(),
            self.adjusted_model(),
            self.dir.join("err.log"),
            self.dir.join("out.log"),
        ];
        files.extend(DYNAMICS_OUTPUTS.iter().map(|s| self.file(&format!("_RRA_{s}"))));
        files
    }
}

/// Remove `path`; a file that is already gone is fine.
pub(crate) fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Loop state, alive only while the controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    /// Next iteration to run (1-based)
    pub iteration: u32,
    /// Most recent recommended mass change (∞ before the first run)
    pub mass_change: f64,
    /// Status of the most recent run
    pub last_status: Option<ToolStatus>,
}

impl ConvergenceState {
    fn new() -> Self {
        Self {
            iteration: 1,
            mass_change: f64::INFINITY,
            last_status: None,
        }
    }

    /// Runs completed so far.
    #[must_use]
    pub const fn runs(&self) -> u32 {
        self.iteration - 1
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IterationOutcome {
    /// |Δm| fell within tolerance
    Converged {
        /// Runs it took
        runs: u32,
        /// Final recommended mass change
        mass_change: f64,
    },
    /// Budget spent with |Δm| still above tolerance
    NotConverged {
        /// Runs made
        runs: u32,
        /// Last recommended mass change
        mass_change: f64,
    },
    /// A run failed or timed out; needs manual inspection
    Failed {
        /// Iteration whose run failed
        iteration: u32,
        /// Terminal status of that run
        status: ToolStatus,
    },
}

impl IterationOutcome {
    /// True only for `Converged`.
    #[must_use]
    pub const fn converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Drives RRA until the recommended mass change is within tolerance.
pub struct RraIterator<'a> {
    runner: &'a dyn ToolRunner,
    parser: &'a dyn RunOutcomeParser,
    spec: ToolSpec,
    limits: IterationConfig,
    layout: ReportLayout,
}

impl<'a> RraIterator<'a> {
    /// Controller using `runner` for tool runs and `parser` for logs.
    #[must_use]
    pub fn new(
        runner: &'a dyn ToolRunner,
        parser: &'a dyn RunOutcomeParser,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            runner,
            parser,
            spec: ToolSpec::new(ToolKind::Rra, &config.tools.rra),
            limits: config.iteration,
            layout: ReportLayout::from_config(config),
        }
    }

    /// Replace the RRA poll spec.
    #[must_use]
    pub fn with_spec(mut self, spec: ToolSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Run the loop for one trial.
    ///
    /// Expects the baseline RRA outputs (log, actuation force, position
    /// errors, adjusted model) and `<trial>__Setup_RRA.xml` in `paths.dir()`.
    ///
    /// # Errors
    ///
    /// - `LogParse` if a log lacks the expected sections
    /// - `ConfigMismatch` if a body, column or setup tag is missing
    /// - `Numeric`/`Io` if an output cannot be read
    ///
    /// Tool failures are not errors; they end the loop as
    /// [`IterationOutcome::Failed`].
    pub fn run(&self, paths: &IterationPaths) -> Result<IterationOutcome> {
        let trial = paths.trial();
        let report = IterationReport::create(paths.report(), self.layout.clone())?;
        self.prepare(paths)?;

        let mut state = ConvergenceState::new();
        let tolerance = self.limits.tolerance;

        loop {
            if state.mass_change.abs() <= tolerance {
                report.append(&self.record(paths, state.runs())?)?;
                remove_if_present(&paths.adjusted_model())?;
                info!(
                    trial,
                    runs = state.runs(),
                    mass_change = state.mass_change,
                    "RRA mass adjustment converged"
                );
                return Ok(IterationOutcome::Converged {
                    runs: state.runs(),
                    mass_change: state.mass_change,
                });
            }
            if state.iteration > self.limits.max_iterations {
                break;
            }

            report.append(&self.record(paths, state.iteration - 1)?)?;
            self.adjust_model(paths)?;
            for stale in paths.stale_outputs() {
                remove_if_present(&stale)?;
            }

            let run = self.runner.run(&paths.invocation(), &self.spec)?;
            state.last_status = Some(run.status);
            if !run.status.passed() {
                error!(
                    trial,
                    iteration = state.iteration,
                    status = %run.status,
                    "{trial} has failed -- check status manually"
                );
                return Ok(IterationOutcome::Failed {
                    iteration: state.iteration,
                    status: run.status,
                });
            }

            state.mass_change = log::parse_mass_change_file(self.parser, &paths.log())?;
            info!(
                trial,
                iteration = state.iteration,
                mass_change = state.mass_change,
                "RRA iteration finished"
            );
            state.iteration += 1;
        }

        // Budget spent; the last run still gets its row.
        report.append(&self.record(paths, state.runs())?)?;
        warn!(
            trial,
            runs = state.runs(),
            mass_change = state.mass_change,
            tolerance,
            "RRA mass adjustment did not converge"
        );
        Ok(IterationOutcome::NotConverged {
            runs: state.runs(),
            mass_change: state.mass_change,
        })
    }

    /// Derive the iteration setup and name the adjusted model after the trial.
    fn prepare(&self, paths: &IterationPaths) -> Result<()> {
        let mut setup = SetupFile::load(paths.setup())?;
        setup.set_field(SetupField::ModelFile, 0, &setup_path(&paths.model())?)?;
        setup.save_as(paths.iteration_setup())?;

        let mut model = ModelFile::load(paths.adjusted_model())?;
        model.rename(paths.trial())?;
        model.save()?;
        debug!(trial = paths.trial(), "iteration setup prepared");
        Ok(())
    }

    /// Report row for the outputs currently on disk.
    fn record(&self, paths: &IterationPaths, iteration: u32) -> Result<IterationRecord> {
        let log_path = paths.log();
        let adjustment = log::parse_log_file(self.parser, &log_path)?;
        let log_name = log_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let residuals = DataTable::read(paths.actuation_force(), TableKind::Actuation)?;
        let errors = DataTable::read(paths.position_errors(), TableKind::PositionError)?;

        Ok(IterationRecord {
            iteration,
            original_masses: adjustment.original_masses(&self.layout.bodies, &log_name)?,
            mass_change: adjustment.total_change,
            center_of_mass: adjustment.center_of_mass,
            residuals: stats::residual_stats(&residuals, &self.layout.residual_actuators)?,
            position_errors: stats::position_error_stats(
                &errors,
                &self.layout.translational,
                &self.layout.rotational,
            )?,
        })
    }

    /// Write the recommended masses into the model the next run simulates.
    fn adjust_model(&self, paths: &IterationPaths) -> Result<()> {
        let adjustment = log::parse_log_file(self.parser, &paths.log())?;
        let mut model = ModelFile::load(paths.adjusted_model())?;
        model.apply_masses(adjustment.adjusted_masses())?;
        std::fs::write(paths.model(), model.as_xml())?;
        Ok(())
    }
}
