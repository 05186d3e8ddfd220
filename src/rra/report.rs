//! Iteration report (`<trial>_RRA__Iterations.data`)
//!
//! Tab-separated text. Row 1 labels the column groups, row 2 names the
//! columns, then one row per iteration:
//!
//! ```text
//! iteration | original mass × bodies | mass change | COM x y z |
//! max/RMS/mean × forces | max/RMS/mean × moments |
//! max/RMS × translational (cm) | max/RMS × rotational (deg)
//! ```
//!
//! Rows are only ever appended.

use super::stats::{PositionErrorStats, ResidualStats};
use crate::config::PipelineConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Column names the report is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLayout {
    /// Bodies whose original mass is recorded
    pub bodies: Vec<String>,
    /// Residual actuators: three forces then three moments
    pub residual_actuators: Vec<String>,
    /// Coordinates reported in centimeters
    pub translational: Vec<String>,
    /// Coordinates reported in degrees
    pub rotational: Vec<String>,
}

impl ReportLayout {
    /// Layout from the pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            bodies: config.bodies.clone(),
            residual_actuators: config.residual_actuators.clone(),
            translational: config.translational_coordinates.clone(),
            rotational: config.rotational_coordinates.clone(),
        }
    }

    /// Columns per row.
    #[must_use]
    pub fn column_count(&self) -> usize {
        1 + self.bodies.len()
            + 1
            + 3
            + 3 * self.residual_actuators.len()
            + 2 * self.translational.len()
            + 2 * self.rotational.len()
    }

    fn forces(&self) -> &[String] {
        &self.residual_actuators[..self.residual_actuators.len().min(3)]
    }

    fn moments(&self) -> &[String] {
        &self.residual_actuators[self.residual_actuators.len().min(3)..]
    }

    /// The two header rows.
    #[must_use]
    pub fn header(&self) -> [Vec<String>; 2] {
        let mut groups: Vec<String> = Vec::with_capacity(self.column_count());
        let mut names: Vec<String> = Vec::with_capacity(self.column_count());
        let mut group = |label: &str, columns: &[String]| {
            for (i, column) in columns.iter().enumerate() {
                groups.push(if i == 0 { label.to_string() } else { String::new() });
                names.push(column.clone());
            }
        };

        group("Iteration", &[String::new()]);
        group("Original Mass", &self.bodies);
        group("Suggested Mass Change", &[String::new()]);
        let xyz = ["X", "Y", "Z"].map(String::from);
        group("New Center of Mass Location (torso)", &xyz);
        for (kind, columns) in [("Force", self.forces()), ("Moment", self.moments())] {
            for stat in ["Max", "RMS", "Avg"] {
                group(&format!("{stat} Residual {kind}"), columns);
            }
        }
        group("Max Position Error (cm)", &self.translational);
        group("RMS Position Error (cm)", &self.translational);
        group("Max Position Error (deg)", &self.rotational);
        group("RMS Position Error (deg)", &self.rotational);

        [groups, names]
    }
}

/// One iteration's row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration label; 0 is the baseline before any adjustment
    pub iteration: u32,
    /// Original masses in layout body order
    pub original_masses: Vec<f64>,
    /// Recommended mass change of the run
    pub mass_change: f64,
    /// Recommended center of mass
    pub center_of_mass: [f64; 3],
    /// Residual statistics in layout actuator order
    pub residuals: Vec<ResidualStats>,
    /// Position-error statistics, translational then rotational
    pub position_errors: Vec<PositionErrorStats>,
}

impl IterationRecord {
    /// Render as report cells.
    ///
    /// # Errors
    ///
    /// Returns `Other` if the record does not fit `layout`
    pub fn to_row(&self, layout: &ReportLayout) -> Result<Vec<String>> {
        let n_pos = layout.translational.len() + layout.rotational.len();
        if self.original_masses.len() != layout.bodies.len()
            || self.residuals.len() != layout.residual_actuators.len()
            || self.position_errors.len() != n_pos
        {
            return Err(Error::Other(format!(
                "iteration {} record has {} masses, {} residuals, {} position errors; layout wants {}, {}, {}",
                self.iteration,
                self.original_masses.len(),
                self.residuals.len(),
                self.position_errors.len(),
                layout.bodies.len(),
                layout.residual_actuators.len(),
                n_pos
            )));
        }

        let mut row = Vec::with_capacity(layout.column_count());
        row.push(self.iteration.to_string());
        row.extend(self.original_masses.iter().map(f64::to_string));
        row.push(self.mass_change.to_string());
        row.extend(self.center_of_mass.iter().map(f64::to_string));

        let split = layout.forces().len();
        for block in [&self.residuals[..split], &self.residuals[split..]] {
            row.extend(block.iter().map(|s| s.max.to_string()));
            row.extend(block.iter().map(|s| s.rms.to_string()));
            row.extend(block.iter().map(|s| s.mean.to_string()));
        }

        let (trans, rot) = self.position_errors.split_at(layout.translational.len());
        for block in [trans, rot] {
            row.extend(block.iter().map(|s| s.max.to_string()));
            row.extend(block.iter().map(|s| s.rms.to_string()));
        }

        debug_assert_eq!(row.len(), layout.column_count());
        Ok(row)
    }
}

/// Append-only report file.
#[derive(Debug, Clone)]
pub struct IterationReport {
    path: PathBuf,
    layout: ReportLayout,
}

impl IterationReport {
    /// Create (or truncate) the report and write its header rows.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn create(path: impl Into<PathBuf>, layout: ReportLayout) -> Result<Self> {
        let path = path.into();
        let [groups, names] = layout.header();
        let text = format!("{}\n{}\n", groups.join("\t"), names.join("\t"));
        std::fs::write(&path, text)?;
        Ok(Self { path, layout })
    }

    /// Report path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout rows are checked against.
    #[must_use]
    pub const fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns error if the record does not fit the layout or the write fails
    pub fn append(&self, record: &IterationRecord) -> Result<()> {
        let row = record.to_row(&self.layout)?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", row.join("\t"))?;
        Ok(())
    }

    /// Data rows written so far (header excluded).
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn rows(&self) -> Result<Vec<Vec<String>>> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(text
            .lines()
            .skip(2)
            .filter(|l| !l.is_empty())
            .map(|l| l.split('\t').map(str::to_string).collect())
            .collect())
    }
}
