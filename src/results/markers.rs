//! Marker trajectories (`<trial>.trc`)

use crate::storage::DataTable;
use crate::{Error, Result};
use std::path::Path;

/// Line with marker names (every third tab field from the third).
const NAMES_LINE: usize = 4;
/// Lines before the first data row.
const PREAMBLE_LINES: usize = 6;

/// Marker trajectories: `Frame#`, `Time`, then `<marker>_X/_Y/_Z` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerData {
    /// Marker names in file order
    pub names: Vec<String>,
    /// Trajectory table
    pub table: DataTable,
}

impl MarkerData {
    /// Read a TRC file.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be read
    /// - `Numeric` naming the line if a row is short or not numeric
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();

        let names: Vec<String> = lines
            .get(NAMES_LINE - 1)
            .ok_or_else(|| Error::numeric(path, format!("line {NAMES_LINE} missing")))?
            .trim_end()
            .split('\t')
            .skip(2)
            .step_by(3)
            .map(|n| n.trim().to_string())
            .collect();

        let width = 2 + 3 * names.len();
        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); width];
        for (idx, line) in lines.iter().enumerate().skip(PREAMBLE_LINES) {
            if line.trim().is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != width {
                return Err(Error::numeric(
                    path,
                    format!("line {}: {} fields, expected {width}", idx + 1, tokens.len()),
                ));
            }
            for (column, token) in columns.iter_mut().zip(tokens) {
                let value = token.parse::<f64>().map_err(|_| {
                    Error::numeric(path, format!("line {}: `{token}` is not a number", idx + 1))
                })?;
                column.push(Some(value));
            }
        }

        let mut labels = vec!["Frame#".to_string(), "Time".to_string()];
        for name in &names {
            for axis in ["X", "Y", "Z"] {
                labels.push(format!("{name}_{axis}"));
            }
        }
        let table = DataTable::from_columns(path, labels.into_iter().zip(columns).collect())?;
        Ok(Self { names, table })
    }

    /// `(x, y, z)` trajectories of `marker`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if the marker is not in the file
    pub fn trajectory(&self, marker: &str) -> Result<[Vec<f64>; 3]> {
        Ok([
            self.table.values(&format!("{marker}_X"))?,
            self.table.values(&format!("{marker}_Y"))?,
            self.table.values(&format!("{marker}_Z"))?,
        ])
    }
}
