//! Residual and position-error statistics
//!
//! Statistics span the whole time series of a run; no gait-cycle window
//! is applied at this stage.

use crate::storage::DataTable;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 1 m = 100 cm.
#[must_use]
pub fn meters_to_centimeters(value: f64) -> f64 {
    value * 100.0
}

/// 1 rad = 180/π deg; π maps to exactly 180.
#[must_use]
pub fn radians_to_degrees(value: f64) -> f64 {
    value / PI * 180.0
}

/// Largest absolute value; 0 for an empty series.
#[must_use]
pub fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Root mean square; NaN for an empty series.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(values: &[f64]) -> f64 {
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Arithmetic mean; NaN for an empty series.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Max, RMS and mean of one residual actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualStats {
    /// max |x|
    pub max: f64,
    /// sqrt(mean x²)
    pub rms: f64,
    /// mean x
    pub mean: f64,
}

impl ResidualStats {
    /// Statistics of `values`.
    #[must_use]
    pub fn of(values: &[f64]) -> Self {
        Self {
            max: max_abs(values),
            rms: rms(values),
            mean: mean(values),
        }
    }
}

/// Max and RMS of one coordinate's tracking error, in report units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionErrorStats {
    /// max |x|
    pub max: f64,
    /// sqrt(mean x²)
    pub rms: f64,
}

impl PositionErrorStats {
    /// Statistics of `values` with `convert` applied to both.
    #[must_use]
    pub fn of(values: &[f64], convert: fn(f64) -> f64) -> Self {
        Self {
            max: convert(max_abs(values)),
            rms: convert(rms(values)),
        }
    }
}

/// An output table with a header but no rows has no statistics.
fn require_samples(table: &DataTable) -> Result<()> {
    if table.num_rows() == 0 {
        return Err(Error::numeric(table.source(), "no samples below the header"));
    }
    Ok(())
}

/// Residual statistics for `actuators`, in that order.
///
/// # Errors
///
/// Returns `ConfigMismatch` for an actuator missing from the table, or
/// `Numeric` if the table has no rows
pub fn residual_stats<S: AsRef<str>>(table: &DataTable, actuators: &[S]) -> Result<Vec<ResidualStats>> {
    require_samples(table)?;
    actuators
        .iter()
        .map(|name| Ok(ResidualStats::of(&table.values(name.as_ref())?)))
        .collect()
}

/// Position-error statistics: translational coordinates in cm, then
/// rotational coordinates in degrees.
///
/// # Errors
///
/// Returns `ConfigMismatch` for a coordinate missing from the table, or
/// `Numeric` if the table has no rows
pub fn position_error_stats<S: AsRef<str>>(
    table: &DataTable,
    translational: &[S],
    rotational: &[S],
) -> Result<Vec<PositionErrorStats>> {
    require_samples(table)?;
    let translations = translational
        .iter()
        .map(|name| Ok(PositionErrorStats::of(&table.values(name.as_ref())?, meters_to_centimeters)));
    let rotations = rotational
        .iter()
        .map(|name| Ok(PositionErrorStats::of(&table.values(name.as_ref())?, radians_to_degrees)));
    translations.chain(rotations).collect()
}
