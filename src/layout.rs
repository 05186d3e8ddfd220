//! File naming conventions for subjects and trials
//!
//! A subject directory holds every trial's inputs and finished outputs:
//!
//! ```text
//! <root>/<subject>/
//!     <subject>_0_StaticPose__Setup_Scale.xml
//!     <subject>.osim                               scaled model
//!     <trial>_GRF.mot  <trial>__Setup_IK.xml ...   per-trial inputs
//!     <trial>/                                     working directory while a tool runs
//! ```
//!
//! Trial names are `<subject>_<descriptor>`, e.g. `20130221CONF_A_Walk_RepGRF`.

use crate::tool::ToolKind;
use std::path::{Path, PathBuf};

/// Paths for one trial of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialLayout {
    subject_dir: PathBuf,
    trial: String,
}

impl TrialLayout {
    /// Layout for `trial` inside `subject_dir`.
    #[must_use]
    pub fn new(subject_dir: impl Into<PathBuf>, trial: impl Into<String>) -> Self {
        Self {
            subject_dir: subject_dir.into(),
            trial: trial.into(),
        }
    }

    /// Layout of the static (scaling) trial of `subject`.
    #[must_use]
    pub fn static_pose(subject_dir: impl Into<PathBuf>, subject: &str) -> Self {
        Self::new(subject_dir, format!("{subject}_0_StaticPose"))
    }

    /// Trial name.
    #[must_use]
    pub fn trial(&self) -> &str {
        &self.trial
    }

    /// Subject id (trial name up to the first underscore).
    #[must_use]
    pub fn subject(&self) -> &str {
        self.trial.split('_').next().unwrap_or(&self.trial)
    }

    /// Subject directory.
    #[must_use]
    pub fn subject_dir(&self) -> &Path {
        &self.subject_dir
    }

    /// Per-trial working directory.
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        self.subject_dir.join(&self.trial)
    }

    /// `<subject_dir>/<trial><suffix>`
    #[must_use]
    pub fn file(&self, suffix: &str) -> PathBuf {
        self.subject_dir.join(format!("{}{suffix}", self.trial))
    }

    /// `<working_dir>/<trial><suffix>`
    #[must_use]
    pub fn work_file(&self, suffix: &str) -> PathBuf {
        self.working_dir().join(format!("{}{suffix}", self.trial))
    }

    /// Setup file name (no directory) for `kind`.
    #[must_use]
    pub fn setup_name(&self, kind: ToolKind) -> String {
        format!("{}__Setup_{}.xml", self.trial, kind.file_tag())
    }

    /// Setup file for `kind` in the subject directory.
    #[must_use]
    pub fn setup(&self, kind: ToolKind) -> PathBuf {
        self.subject_dir.join(self.setup_name(kind))
    }

    /// Log file name for `kind`.
    #[must_use]
    pub fn log_name(&self, kind: ToolKind) -> String {
        format!("{}_{}.log", self.trial, kind.file_tag())
    }

    /// File whose appearance means `kind` finished.
    #[must_use]
    pub fn artifact_name(&self, kind: ToolKind) -> String {
        match kind {
            ToolKind::Scale => format!("{}.osim", self.subject()),
            ToolKind::Ik => format!("{}_IK.mot", self.trial),
            ToolKind::Id => format!("{}_ID.sto", self.trial),
            ToolKind::Rra => format!("{}_RRA_controls.xml", self.trial),
            ToolKind::Cmc => format!("{}_CMC_controls.xml", self.trial),
        }
    }

    /// GRF record of the trial.
    #[must_use]
    pub fn grf(&self) -> PathBuf {
        self.file("_GRF.mot")
    }
}

/// Output suffixes RRA and CMC write next to `<trial>_<TOOL>`.
pub const DYNAMICS_OUTPUTS: [&str; 11] = [
    "Actuation_force.sto",
    "Actuation_power.sto",
    "Actuation_speed.sto",
    "Kinematics_dudt.sto",
    "Kinematics_q.sto",
    "Kinematics_u.sto",
    "avgResiduals.txt",
    "controls.sto",
    "controls.xml",
    "pErr.sto",
    "states.sto",
];

/// `path` as written into a setup file. Tools resolve relative paths
/// against their own working directory, so relative paths are anchored at
/// the current directory.
///
/// # Errors
///
/// Returns error if `path` is relative and the current directory is unavailable
pub fn setup_path(path: &Path) -> std::io::Result<String> {
    if path.is_absolute() {
        return Ok(path.display().to_string());
    }
    Ok(std::env::current_dir()?.join(path).display().to_string())
}

/// Trial names of `subject`, discovered from `<subject>*_GRF.mot` files.
///
/// # Errors
///
/// Returns error if the subject directory cannot be listed
pub fn discover_trials(subject_dir: &Path, subject: &str) -> std::io::Result<Vec<String>> {
    let mut trials: Vec<String> = std::fs::read_dir(subject_dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(subject))
        .filter_map(|name| name.strip_suffix("_GRF.mot").map(str::to_string))
        .collect();
    trials.sort();
    Ok(trials)
}
