//! Cohort aggregation of normalised muscle forces
//!
//! For one cycle type (trial descriptor such as `A_Walk_RepGRF`) every
//! subject's normalised muscle forces are loaded in parallel and reduced
//! to an elementwise mean and population standard deviation per muscle.
//! A subject whose results are missing is logged by name and left out; the
//! summary covers whoever remains. Results that exist but do not parse
//! fail the aggregation.

use super::simulation::{load_muscle_forces, PERCENT_CYCLE};
use super::spline::percent_cycle;
use crate::storage::DataTable;
use crate::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

/// A cohort member left out of a summary, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingMember {
    /// Subject id
    pub subject: String,
    /// Error that excluded the subject
    pub reason: String,
}

/// Group statistics for one cycle type.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    /// Cycle type (trial descriptor)
    pub cycle: String,
    /// Subjects the statistics cover
    pub members: Vec<String>,
    /// Subjects left out
    pub missing: Vec<MissingMember>,
    /// `percentCycle`, then `<muscle>_mean` and `<muscle>_std` per muscle;
    /// `None` when no subject was available
    pub table: Option<DataTable>,
}

impl GroupSummary {
    /// Names of the subjects left out.
    #[must_use]
    pub fn missing_subjects(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.subject.as_str()).collect()
    }

    /// Export the statistics table as Parquet.
    ///
    /// Returns `false` without writing when there are no statistics.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file cannot be written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        match &self.table {
            Some(table) => {
                table.write_parquet(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Elementwise mean and population standard deviation of equal-length series.
///
/// Returns empty vectors for no series.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_std(series: &[&[f64]]) -> (Vec<f64>, Vec<f64>) {
    let Some(first) = series.first() else {
        return (Vec::new(), Vec::new());
    };
    let n = series.len() as f64;
    let len = first.len();
    let mut mean = vec![0.0; len];
    for s in series {
        for (acc, v) in mean.iter_mut().zip(s.iter()) {
            *acc += v / n;
        }
    }
    let mut std = vec![0.0; len];
    for s in series {
        for ((acc, v), m) in std.iter_mut().zip(s.iter()).zip(&mean) {
            *acc += (v - m).powi(2) / n;
        }
    }
    for v in &mut std {
        *v = v.sqrt();
    }
    (mean, std)
}

/// Aggregate `cycle` over `subjects`, each living in `subjects_root/<subject>`.
///
/// Members without result files, or with a muscle set that differs from
/// the cohort, are reported in [`GroupSummary::missing`].
///
/// # Errors
///
/// Returns the first member's error if a result file exists but cannot be
/// parsed (`Numeric`, `Xml`, ...)
pub fn aggregate_cycle(
    subjects_root: &Path,
    subjects: &[String],
    cycle: &str,
) -> Result<GroupSummary> {
    let loaded: Vec<(String, Result<DataTable>)> = subjects
        .par_iter()
        .map(|subject| {
            let trial = format!("{subject}_{cycle}");
            let result = load_muscle_forces(&subjects_root.join(subject), &trial);
            (subject.clone(), result)
        })
        .collect();

    let mut available: Vec<(String, DataTable)> = Vec::new();
    let mut missing = Vec::new();
    for (subject, result) in loaded {
        match result {
            Ok(table) => available.push((subject, table)),
            Err(e) if !e.is_not_found() => {
                error!(subject = %subject, cycle, error = %e, "unreadable results");
                return Err(e);
            }
            Err(e) => {
                warn!(subject = %subject, cycle, error = %e, "left out of group summary");
                missing.push(MissingMember {
                    subject,
                    reason: e.to_string(),
                });
            }
        }
    }

    // Muscle columns of the first member define the summary.
    let muscles: Vec<String> = available.first().map_or_else(Vec::new, |(_, table)| {
        table
            .names()
            .into_iter()
            .filter(|n| n != PERCENT_CYCLE)
            .collect()
    });
    let mut members = Vec::new();
    let mut series: Vec<Vec<Vec<f64>>> = Vec::new();
    for (subject, table) in available {
        let columns: Result<Vec<Vec<f64>>> = muscles.iter().map(|m| table.values(m)).collect();
        match columns {
            Ok(columns) => {
                members.push(subject);
                series.push(columns);
            }
            Err(e) => {
                warn!(subject = %subject, cycle, error = %e, "muscle set differs from cohort");
                missing.push(MissingMember {
                    subject,
                    reason: e.to_string(),
                });
            }
        }
    }

    let table = if members.is_empty() {
        None
    } else {
        let mut columns = vec![(
            PERCENT_CYCLE.to_string(),
            percent_cycle().into_iter().map(Some).collect::<Vec<_>>(),
        )];
        for (k, muscle) in muscles.iter().enumerate() {
            let per_member: Vec<&[f64]> = series.iter().map(|cols| cols[k].as_slice()).collect();
            let (mean, std) = mean_std(&per_member);
            columns.push((format!("{muscle}_mean"), mean.into_iter().map(Some).collect()));
            columns.push((format!("{muscle}_std"), std.into_iter().map(Some).collect()));
        }
        Some(DataTable::from_columns(format!("{cycle}_group"), columns)?)
    };

    info!(
        cycle,
        members = members.len(),
        missing = missing.len(),
        "group summary computed"
    );
    Ok(GroupSummary {
        cycle: cycle.to_string(),
        members,
        missing,
        table,
    })
}

/// Summaries for every cycle in `cycles`.
///
/// # Errors
///
/// See [`aggregate_cycle`]
pub fn aggregate_group(
    subjects_root: &Path,
    subjects: &[String],
    cycles: &[String],
) -> Result<Vec<GroupSummary>> {
    cycles
        .iter()
        .map(|cycle| aggregate_cycle(subjects_root, subjects, cycle))
        .collect()
}
