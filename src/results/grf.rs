//! Ground reaction force records (`<trial>_GRF.mot`)
//!
//! Lines 9 to 11 carry the gait cycle (frames, samples, times), the
//! column header is on line 14. Channels are renamed to the short lab
//! names: `GROUND_FORCER_VY` → `RFY`, `GROUND_FORCER_PX` → `RCX`,
//! `GROUND_TORQUEL_Z` → `LMZ`.

use crate::storage::{DataTable, TableKind};
use crate::{Error, Result};
use arrow::array::Float64Array;
use std::path::Path;
use tracing::debug;

const CYCLE_FRAMES_LINE: usize = 9;
const CYCLE_SAMPLES_LINE: usize = 10;
const CYCLE_TIMES_LINE: usize = 11;

/// Short channel name for a raw GRF column header.
///
/// Returns `None` for headers that are not force, COP or torque channels.
#[must_use]
pub fn short_channel_name(header: &str) -> Option<String> {
    let upper = header.to_ascii_uppercase();
    let side_axis = |rest: &str, sep: &str| -> Option<(char, char)> {
        let (side, axis) = rest.split_once(sep)?;
        let side = single(side, &['L', 'R'])?;
        let axis = single(axis, &['X', 'Y', 'Z'])?;
        Some((side, axis))
    };
    if let Some(rest) = upper.strip_prefix("GROUND_FORCE") {
        if let Some((s, a)) = side_axis(rest, "_V") {
            return Some(format!("{s}F{a}"));
        }
        if let Some((s, a)) = side_axis(rest, "_P") {
            return Some(format!("{s}C{a}"));
        }
    }
    if let Some(rest) = upper.strip_prefix("GROUND_TORQUE") {
        if let Some((s, a)) = side_axis(rest, "_") {
            return Some(format!("{s}M{a}"));
        }
    }
    None
}

fn single(token: &str, allowed: &[char]) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if allowed.contains(&c) => Some(c),
        _ => None,
    }
}

/// Null the COP of every sample whose vertical force on that side is 0.
///
/// The force plates write an exact zero COP when unloaded; it is not a
/// real position. Sides are handled independently.
///
/// # Errors
///
/// Returns `ConfigMismatch` if a side's force or COP channel is missing
pub fn mask_cop_sentinels(table: &mut DataTable) -> Result<()> {
    for side in ['R', 'L'] {
        let unloaded: Vec<bool> = table
            .column(&format!("{side}FY"))?
            .iter()
            .map(|v| v == Some(0.0))
            .collect();
        let count = unloaded.iter().filter(|u| **u).count();
        for axis in ['X', 'Y', 'Z'] {
            let name = format!("{side}C{axis}");
            let masked: Float64Array = table
                .column(&name)?
                .iter()
                .zip(&unloaded)
                .map(|(v, &u)| if u { None } else { v })
                .collect();
            table.replace_column(&name, masked)?;
        }
        debug!(side = %side, samples = count, "COP sentinels masked");
    }
    Ok(())
}

/// A force-plate record with its gait cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundReaction {
    /// Cycle frame numbers
    pub cycle_frames: Vec<f64>,
    /// Cycle sample numbers
    pub cycle_samples: Vec<f64>,
    /// Cycle event times; `[0]` and `[1]` bound the normalised cycle
    pub cycle_times: Vec<f64>,
    /// `time` plus renamed channels, COP sentinels masked
    pub table: DataTable,
}

impl GroundReaction {
    /// Read and clean a GRF record.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be read
    /// - `Numeric` if the cycle lines or data are not numeric
    /// - `ConfigMismatch` if force or COP channels are missing
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();

        let cycle = |line_no: usize| cycle_line(path, &lines, line_no);
        let cycle_frames = cycle(CYCLE_FRAMES_LINE)?;
        let cycle_samples = cycle(CYCLE_SAMPLES_LINE)?;
        let cycle_times = cycle(CYCLE_TIMES_LINE)?;

        let mut table =
            DataTable::parse_delimited(path, &text, TableKind::GroundReaction.header_line())?;
        table.rename_columns(|name| {
            if name.eq_ignore_ascii_case("time") {
                None
            } else {
                Some(short_channel_name(name).unwrap_or_else(|| name.to_ascii_uppercase()))
            }
        })?;
        mask_cop_sentinels(&mut table)?;

        Ok(Self {
            cycle_frames,
            cycle_samples,
            cycle_times,
            table,
        })
    }

    /// Start and end time of the normalised cycle.
    ///
    /// # Errors
    ///
    /// Returns `Numeric` if fewer than two cycle times are recorded
    pub fn cycle_bounds(&self) -> Result<(f64, f64)> {
        match self.cycle_times.as_slice() {
            [start, end, ..] => Ok((*start, *end)),
            _ => Err(Error::numeric(
                self.table.source(),
                format!("line {CYCLE_TIMES_LINE}: needs two cycle times"),
            )),
        }
    }

    /// Last recorded cycle time.
    #[must_use]
    pub fn last_cycle_time(&self) -> Option<f64> {
        self.cycle_times.last().copied()
    }
}

/// Values after the label of a tab-separated cycle line (1-based).
pub(crate) fn cycle_line(path: &Path, lines: &[&str], line_no: usize) -> Result<Vec<f64>> {
    let line = lines
        .get(line_no - 1)
        .ok_or_else(|| Error::numeric(path, format!("line {line_no} missing")))?;
    line.trim_end()
        .split('\t')
        .skip(1)
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            t.trim().parse::<f64>().map_err(|_| {
                Error::numeric(path, format!("line {line_no}: `{t}` is not a number"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_channel_names() {
        assert_eq!(short_channel_name("ground_forceR_vy").as_deref(), Some("RFY"));
        assert_eq!(short_channel_name("GROUND_FORCEL_PZ").as_deref(), Some("LCZ"));
        assert_eq!(short_channel_name("ground_torqueR_x").as_deref(), Some("RMX"));
        assert_eq!(short_channel_name("GROUND_FORCEQ_VY"), None);
        assert_eq!(short_channel_name("time"), None);
    }

    #[test]
    fn test_cycle_line() {
        let lines = ["a", "cycleTime\t0.52\t1.61\t2.7"];
        let values = cycle_line(Path::new("x_GRF.mot"), &lines, 2).unwrap();
        assert_eq!(values, vec![0.52, 1.61, 2.7]);
        assert!(cycle_line(Path::new("x_GRF.mot"), &lines, 5).is_err());
    }
}
