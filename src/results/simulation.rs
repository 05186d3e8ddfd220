//! One trial's finished results
//!
//! Loads every output of a trial into tables and resamples the simulated
//! muscle forces onto the percent-of-cycle axis. Missing RRA or CMC output
//! is tolerated (the pipeline may not have reached it); anything that
//! exists but does not parse is an error.

use super::grf::GroundReaction;
use super::markers::MarkerData;
use super::spline::{normalize_cycle, percent_cycle};
use crate::layout::TrialLayout;
use crate::model::{SetupField, SetupFile};
use crate::storage::{DataTable, TableKind};
use crate::tool::ToolKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Column holding the percent-of-cycle axis in normalised tables.
pub const PERCENT_CYCLE: &str = "percentCycle";

/// Knee-spanning muscles of the `gait2392` model.
pub const GAIT2392_MUSCLES: [&str; 10] = [
    "vas_med", "vas_lat", "vas_int", "rect_fem", "semimem", "semiten", "bifemlh", "bifemsh",
    "med_gas", "lat_gas",
];

/// The same muscles in the other lab models.
pub const LAB_MUSCLES: [&str; 10] = [
    "vasmed", "vaslat", "vasint", "recfem", "semimem", "semiten", "bflh", "bfsh", "gasmed",
    "gaslat",
];

/// Muscle names used by `model`.
#[must_use]
pub fn muscles_for_model(model: &str) -> [&'static str; 10] {
    if model == "gait2392" {
        GAIT2392_MUSCLES
    } else {
        LAB_MUSCLES
    }
}

/// Generic model the subject was scaled from: stem of the static pose
/// setup's `model_file`.
///
/// # Errors
///
/// Returns error if the scale setup cannot be read or has no `model_file`
pub fn generic_model_name(subject_dir: &Path, subject: &str) -> Result<String> {
    let layout = TrialLayout::static_pose(subject_dir, subject);
    let setup = SetupFile::load(layout.setup(ToolKind::Scale))?;
    let model_file = setup.field(SetupField::ModelFile, 0)?;
    // Setups written on Windows carry backslashes.
    let file_name = model_file
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(&model_file)
        .to_string();
    Ok(file_name
        .rsplit_once('.')
        .map_or(file_name.clone(), |(stem, _)| stem.to_string()))
}

/// Simulated leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    /// Right
    Right,
    /// Left
    Left,
}

impl Leg {
    /// Suffix used in channel names (`r` / `l`).
    #[must_use]
    pub const fn suffix(self) -> char {
        match self {
            Self::Right => 'r',
            Self::Left => 'l',
        }
    }

    /// Leg simulated in `descriptor` for `subject`.
    ///
    /// The subject id encodes the affected side at character 10 (`N` none,
    /// `R` right, `L` left); descriptors starting with `A` simulate the
    /// affected leg, others the unaffected one. Uninjured subjects count
    /// their right leg as "affected".
    ///
    /// # Errors
    ///
    /// Returns `Config` if the subject id has no side code
    pub fn for_trial(subject: &str, descriptor: &str) -> Result<Self> {
        let affected = descriptor.starts_with('A');
        match subject.chars().nth(10) {
            Some('N' | 'R') => Ok(if affected { Self::Right } else { Self::Left }),
            Some('L') => Ok(if affected { Self::Left } else { Self::Right }),
            other => Err(Error::Config(format!(
                "subject id {subject} has no side code at position 10 (found {other:?})"
            ))),
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// Outputs RRA and CMC write under `<trial>_<TOOL>_*`.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsOutputs {
    /// `Actuation_force.sto`
    pub actuation_force: DataTable,
    /// `controls.sto`
    pub controls: DataTable,
    /// `Kinematics_q.sto`
    pub coordinates: DataTable,
    /// `Kinematics_u.sto`
    pub speeds: DataTable,
    /// `Kinematics_dudt.sto`
    pub accelerations: DataTable,
    /// `pErr.sto`
    pub position_error: DataTable,
    /// `states.sto`
    pub states: DataTable,
    /// `Actuation_speed.sto` (RRA only)
    pub actuation_speed: Option<DataTable>,
    /// `Actuation_power.sto` (RRA only)
    pub actuation_power: Option<DataTable>,
}

impl DynamicsOutputs {
    /// Load the outputs of `kind` (RRA or CMC) for `layout`'s trial.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a file is missing, `Numeric` if one does not parse
    pub fn load(layout: &TrialLayout, kind: ToolKind) -> Result<Self> {
        let tag = kind.file_tag();
        let read = |suffix: &str, table: TableKind| {
            DataTable::read(layout.file(&format!("_{tag}_{suffix}")), table)
        };
        let (actuation_speed, actuation_power) = if kind == ToolKind::Rra {
            (
                Some(read("Actuation_speed.sto", TableKind::Actuation)?),
                Some(read("Actuation_power.sto", TableKind::Actuation)?),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            actuation_force: read("Actuation_force.sto", TableKind::Actuation)?,
            controls: read("controls.sto", TableKind::Controls)?,
            coordinates: read("Kinematics_q.sto", TableKind::Motion)?,
            speeds: read("Kinematics_u.sto", TableKind::Motion)?,
            accelerations: read("Kinematics_dudt.sto", TableKind::Motion)?,
            position_error: read("pErr.sto", TableKind::PositionError)?,
            states: read("states.sto", TableKind::States)?,
            actuation_speed,
            actuation_power,
        })
    }
}

/// `Ok(None)` for a missing file, other errors pass through.
fn optional<T>(result: Result<T>, what: &str, trial: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            warn!(trial, what, "unable to find output file(s)");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Resample the CMC muscle forces of `leg` onto the percent-of-cycle axis.
///
/// The result has a `percentCycle` column then one column per muscle,
/// named without the leg suffix.
///
/// # Errors
///
/// Returns `ConfigMismatch` if a muscle channel is missing, or a spline
/// error if the force series cannot be fitted
pub fn normalized_muscle_forces(
    actuation_force: &DataTable,
    muscles: &[&str],
    leg: Leg,
    cycle: (f64, f64),
) -> Result<DataTable> {
    let time = actuation_force.time()?;
    let mut columns = vec![(
        PERCENT_CYCLE.to_string(),
        percent_cycle().into_iter().map(Some).collect::<Vec<_>>(),
    )];
    for muscle in muscles {
        let channel = format!("{muscle}_{}", leg.suffix());
        let force = actuation_force.values(&channel)?;
        let normalized = normalize_cycle(&time, &force, cycle.0, cycle.1)?;
        columns.push(((*muscle).to_string(), normalized.into_iter().map(Some).collect()));
    }
    DataTable::from_columns(actuation_force.source(), columns)
}

/// Everything the pipeline produced for one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    /// Trial name
    pub trial: String,
    /// Generic model name
    pub model: String,
    /// Simulated leg
    pub leg: Leg,
    /// Muscles of interest (no leg suffix)
    pub muscles: Vec<String>,
    /// Marker trajectories
    pub markers: MarkerData,
    /// Force plates
    pub grf: GroundReaction,
    /// Inverse kinematics
    pub ik: DataTable,
    /// Inverse dynamics
    pub id: DataTable,
    /// RRA outputs, if present
    pub rra: Option<DynamicsOutputs>,
    /// CMC outputs, if present
    pub cmc: Option<DynamicsOutputs>,
    /// Normalised muscle forces, if CMC output is present
    pub muscle_forces: Option<DataTable>,
}

impl Simulation {
    /// Load `trial` of the subject in `subject_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if a marker, GRF, IK or ID file is missing or malformed,
    /// or if RRA/CMC output exists but is malformed
    pub fn load(subject_dir: &Path, trial: &str) -> Result<Self> {
        let layout = TrialLayout::new(subject_dir, trial);
        let subject = layout.subject().to_string();
        let descriptor = trial
            .split_once('_')
            .map_or("", |(_, descriptor)| descriptor);

        let model = generic_model_name(subject_dir, &subject)?;
        let muscles = muscles_for_model(&model);
        let leg = Leg::for_trial(&subject, descriptor)?;

        let markers = MarkerData::read(layout.file(".trc"))?;
        let grf = GroundReaction::read(layout.grf())?;
        let ik = DataTable::read(layout.file("_IK.mot"), TableKind::Motion)?;
        let id = DataTable::read(layout.file("_ID.sto"), TableKind::InverseDynamics)?;
        let rra = optional(DynamicsOutputs::load(&layout, ToolKind::Rra), "RRA", trial)?;
        let cmc = optional(DynamicsOutputs::load(&layout, ToolKind::Cmc), "CMC", trial)?;

        let muscle_forces = match &cmc {
            Some(outputs) => Some(normalized_muscle_forces(
                &outputs.actuation_force,
                &muscles,
                leg,
                grf.cycle_bounds()?,
            )?),
            None => None,
        };

        Ok(Self {
            trial: trial.to_string(),
            model,
            leg,
            muscles: muscles.iter().map(|m| (*m).to_string()).collect(),
            markers,
            grf,
            ik,
            id,
            rra,
            cmc,
            muscle_forces,
        })
    }
}

/// Normalised muscle forces of one trial, loading only what they need.
///
/// # Errors
///
/// Returns error if the scale setup, GRF record or CMC actuation force is
/// missing or malformed
pub fn load_muscle_forces(subject_dir: &Path, trial: &str) -> Result<DataTable> {
    let layout = TrialLayout::new(subject_dir, trial);
    let subject = layout.subject().to_string();
    let descriptor = trial.split_once('_').map_or("", |(_, d)| d);
    let model = generic_model_name(subject_dir, &subject)?;
    let leg = Leg::for_trial(&subject, descriptor)?;
    let grf = GroundReaction::read(layout.grf())?;
    let forces = DataTable::read(layout.file("_CMC_Actuation_force.sto"), TableKind::Actuation)?;
    normalized_muscle_forces(&forces, &muscles_for_model(&model), leg, grf.cycle_bounds()?)
}
