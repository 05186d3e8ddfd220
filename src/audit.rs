//! Missing-file audit
//!
//! Lists, stage by stage, which expected inputs and outputs a subject
//! directory lacks. Dynamic trials are found from their marker files
//! (`<subject>_<n>_<task>_<condition>.trc`).

use crate::layout::{TrialLayout, DYNAMICS_OUTPUTS};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Pipeline stage a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Subject information
    Info,
    /// Scaling
    Scale,
    /// Force plate and EMG inputs
    Inputs,
    /// Inverse kinematics
    Ik,
    /// Inverse dynamics
    Id,
    /// Residual reduction and mass iteration
    Rra,
    /// Computed muscle control
    Cmc,
}

impl Stage {
    /// Suffixes expected after the trial name for this stage.
    #[must_use]
    pub fn suffixes(self) -> Vec<String> {
        let fixed = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        match self {
            Self::Info => fixed(&["__PersonalInformation.xml"]),
            Self::Scale => fixed(&[
                ".trc",
                "__Setup_Scale.xml",
                "_Scale.log",
                "_Scale.mot",
                "_ScaleSet.xml",
            ]),
            Self::Inputs => fixed(&["_GRF.mot", "_ExternalLoads.xml", "_EMG.mot"]),
            Self::Ik => fixed(&["__Setup_IK.xml", "_IK.log", "_IK.mot"]),
            Self::Id => fixed(&["__Setup_ID.xml", "_ID.log", "_ID.sto"]),
            Self::Rra => {
                let mut list = fixed(&[
                    "__Setup_RRA.xml",
                    "__Setup_RRA_Iterations.xml",
                    "_RRA.log",
                    "_RRA__Iterations.data",
                ]);
                list.extend(DYNAMICS_OUTPUTS.iter().map(|s| format!("_RRA_{s}")));
                list
            }
            Self::Cmc => {
                let mut list = fixed(&["__Setup_CMC.xml", "_CMC.log"]);
                list.extend(
                    DYNAMICS_OUTPUTS
                        .iter()
                        .filter(|s| **s != "avgResiduals.txt")
                        .map(|s| format!("_CMC_{s}")),
                );
                list
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Scale => "Scale",
            Self::Inputs => "GRF/EMG",
            Self::Ik => "IK",
            Self::Id => "ID",
            Self::Rra => "RRA",
            Self::Cmc => "CMC",
        })
    }
}

/// One expected file that is not there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingFile {
    /// Stage expecting it
    pub stage: Stage,
    /// File name within the subject directory
    pub file: String,
}

/// Dynamic trials of `subject`: marker files with a task and condition.
///
/// # Errors
///
/// Returns `Io` if the subject directory cannot be listed
pub fn dynamic_trials(subject_dir: &Path, subject: &str) -> Result<Vec<String>> {
    let prefix = format!("{subject}_");
    let mut trials: Vec<String> = std::fs::read_dir(subject_dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.strip_suffix(".trc").map(str::to_string))
        .filter(|stem| stem.starts_with(&prefix) && stem.matches('_').count() >= 3)
        .collect();
    trials.sort();
    Ok(trials)
}

fn check(layout: &TrialLayout, stage: Stage, missing: &mut Vec<MissingFile>) {
    for suffix in stage.suffixes() {
        if !layout.file(&suffix).exists() {
            missing.push(MissingFile {
                stage,
                file: format!("{}{suffix}", layout.trial()),
            });
        }
    }
}

/// Every expected file missing from the subject directory.
///
/// # Errors
///
/// Returns `Io` if the subject directory cannot be listed
pub fn audit_subject(subject_dir: &Path, subject: &str) -> Result<Vec<MissingFile>> {
    let mut missing = Vec::new();

    check(&TrialLayout::new(subject_dir, subject), Stage::Info, &mut missing);
    check(&TrialLayout::static_pose(subject_dir, subject), Stage::Scale, &mut missing);
    if !subject_dir.join(format!("{subject}.osim")).exists() {
        missing.push(MissingFile {
            stage: Stage::Scale,
            file: format!("{subject}.osim"),
        });
    }

    for trial in dynamic_trials(subject_dir, subject)? {
        let layout = TrialLayout::new(subject_dir, trial);
        for stage in [Stage::Inputs, Stage::Ik, Stage::Id, Stage::Rra, Stage::Cmc] {
            check(&layout, stage, &mut missing);
        }
    }

    for m in &missing {
        warn!(subject, stage = %m.stage, "{} is missing", m.file);
    }
    info!(subject, missing = missing.len(), "audit finished");
    Ok(missing)
}
