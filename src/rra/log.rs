//! RRA log parser
//!
//! RRA prints its mass recommendations as console text:
//!
//! ```text
//! *  torso: new COM ~ [-0.0288,0.3188,0.0012]
//! *
//! *  Recommended mass adjustments:
//! *  Total mass change: 0.231
//! *  pelvis: orig mass = 11.777, new mass = 11.8419
//! *  femur_r: orig mass = 9.3014, new mass = 9.3204
//! *
//! *  Note: Edit the model to make recommended adjustments to mass and COM.
//! ```
//!
//! The section is located by its marker phrases, searching from the end of
//! the log so a reused log yields the most recent run. Every row between
//! the markers must have the body-row shape; anything else is a
//! [`Error::LogParse`] carrying the line number.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opens the mass adjustment section.
pub const SECTION_START: &str = "Recommended mass adjustments";
/// Closes the mass adjustment section.
pub const SECTION_END: &str = "Note: Edit the model to make recommended";
/// Precedes the scalar mass change.
pub const TOTAL_MASS_CHANGE: &str = "Total mass change";

/// Lines above the section searched for the new center of mass.
const COM_LOOKBACK: usize = 5;

/// One row of the recommendation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyMassAdjustment {
    /// Body name
    pub body: String,
    /// Mass in the model that was simulated
    pub original: f64,
    /// Recommended mass
    pub adjusted: f64,
}

/// Everything RRA recommends after one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassAdjustment {
    /// Per-body rows in log order
    pub bodies: Vec<BodyMassAdjustment>,
    /// Recommended total mass change
    pub total_change: f64,
    /// New center of mass of the adjusted body
    pub center_of_mass: [f64; 3],
}

impl MassAdjustment {
    /// Row for `body`.
    #[must_use]
    pub fn body(&self, body: &str) -> Option<&BodyMassAdjustment> {
        self.bodies.iter().find(|b| b.body == body)
    }

    /// Original masses of `bodies`, in that order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` for the first body the log does not list
    pub fn original_masses<S: AsRef<str>>(&self, bodies: &[S], log_name: &str) -> Result<Vec<f64>> {
        bodies
            .iter()
            .map(|name| {
                self.body(name.as_ref())
                    .map(|b| b.original)
                    .ok_or_else(|| Error::mismatch(name.as_ref(), log_name))
            })
            .collect()
    }

    /// `(body, recommended mass)` pairs.
    pub fn adjusted_masses(&self) -> impl Iterator<Item = (&str, f64)> {
        self.bodies.iter().map(|b| (b.body.as_str(), b.adjusted))
    }
}

/// Extracts run outcomes from a tool log.
///
/// Only this seam knows the log is free text; a structured output mode
/// would swap the implementation.
pub trait RunOutcomeParser: Send + Sync {
    /// Full recommendation of the most recent run in `log`.
    ///
    /// # Errors
    ///
    /// Returns `LogParse` if the section is absent or malformed
    fn mass_adjustment(&self, log: &str) -> Result<MassAdjustment>;

    /// Scalar mass change of the most recent run in `log`.
    ///
    /// # Errors
    ///
    /// Returns `LogParse` if no mass change line is present
    fn mass_change(&self, log: &str) -> Result<f64>;
}

/// Parser for RRA's console text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextLogParser;

impl RunOutcomeParser for TextLogParser {
    fn mass_adjustment(&self, log: &str) -> Result<MassAdjustment> {
        parse_mass_adjustment(log)
    }

    fn mass_change(&self, log: &str) -> Result<f64> {
        parse_mass_change(log)
    }
}

/// Read `path` and parse its mass adjustment with `parser`.
///
/// # Errors
///
/// Returns `Io` if the log cannot be read, otherwise as the parser
pub fn parse_log_file(parser: &dyn RunOutcomeParser, path: &Path) -> Result<MassAdjustment> {
    let text = read_log(path)?;
    parser.mass_adjustment(&text).map_err(|e| with_file(e, path))
}

/// Read `path` and parse its scalar mass change with `parser`.
///
/// # Errors
///
/// Returns `Io` if the log cannot be read, otherwise as the parser
pub fn parse_mass_change_file(parser: &dyn RunOutcomeParser, path: &Path) -> Result<f64> {
    let text = read_log(path)?;
    parser.mass_change(&text).map_err(|e| with_file(e, path))
}

fn read_log(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn with_file(error: Error, path: &Path) -> Error {
    match error {
        Error::LogParse(msg) => Error::LogParse(format!("{}: {msg}", path.display())),
        other => other,
    }
}

fn number(token: &str, line_no: usize, what: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| Error::LogParse(format!("line {line_no}: {what} `{token}` is not a number")))
}

fn is_filler(line: &str) -> bool {
    line.trim().trim_start_matches('*').trim().is_empty()
}

/// Parse the most recent mass adjustment section.
///
/// # Errors
///
/// Returns `LogParse` when a marker, the mass change or the center of mass
/// is missing, or a body row has an unexpected shape
pub fn parse_mass_adjustment(log: &str) -> Result<MassAdjustment> {
    let lines: Vec<&str> = log.lines().collect();
    let start = lines
        .iter()
        .rposition(|l| l.contains(SECTION_START))
        .ok_or_else(|| Error::LogParse(format!("`{SECTION_START}` not found")))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.contains(SECTION_END))
        .map(|offset| start + 1 + offset)
        .ok_or_else(|| {
            Error::LogParse(format!(
                "`{SECTION_END}` not found after line {}",
                start + 1
            ))
        })?;

    let total_idx = lines[start + 1..end]
        .iter()
        .position(|l| l.contains(TOTAL_MASS_CHANGE))
        .map(|offset| start + 1 + offset)
        .ok_or_else(|| {
            Error::LogParse(format!("`{TOTAL_MASS_CHANGE}` missing from section at line {}", start + 1))
        })?;
    let total_line = lines[total_idx];
    let total_token = total_line
        .split_once(": ")
        .map(|(_, v)| v.trim())
        .ok_or_else(|| Error::LogParse(format!("line {}: no value after `: `", total_idx + 1)))?;
    let total_change = number(total_token, total_idx + 1, "mass change")?;

    let center_of_mass = parse_center_of_mass(&lines, start)?;

    let mut bodies = Vec::new();
    for (idx, line) in lines.iter().enumerate().take(end).skip(total_idx + 1) {
        if is_filler(line) {
            continue;
        }
        bodies.push(parse_body_row(line, idx + 1)?);
    }
    if bodies.is_empty() {
        return Err(Error::LogParse(format!(
            "no body rows between lines {} and {}",
            start + 1,
            end + 1
        )));
    }

    Ok(MassAdjustment {
        bodies,
        total_change,
        center_of_mass,
    })
}

fn parse_center_of_mass(lines: &[&str], start: usize) -> Result<[f64; 3]> {
    let from = start.saturating_sub(COM_LOOKBACK);
    let (idx, line) = (from..start)
        .rev()
        .map(|i| (i, lines[i]))
        .find(|(_, l)| l.contains('~'))
        .ok_or_else(|| {
            Error::LogParse(format!("no center of mass within {COM_LOOKBACK} lines of line {}", start + 1))
        })?;
    let line_no = idx + 1;
    let triple = line
        .split_once('~')
        .map(|(_, rest)| rest.trim())
        .and_then(|rest| rest.strip_prefix('['))
        .and_then(|rest| rest.split(']').next())
        .ok_or_else(|| Error::LogParse(format!("line {line_no}: center of mass not bracketed")))?;
    let parts: Vec<&str> = triple.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(Error::LogParse(format!(
            "line {line_no}: center of mass has {} components",
            parts.len()
        )));
    }
    Ok([
        number(parts[0], line_no, "COM x")?,
        number(parts[1], line_no, "COM y")?,
        number(parts[2], line_no, "COM z")?,
    ])
}

fn parse_body_row(line: &str, line_no: usize) -> Result<BodyMassAdjustment> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let malformed = || Error::LogParse(format!("line {line_no}: unexpected mass row `{}`", line.trim()));
    if tokens.len() < 6 {
        return Err(malformed());
    }
    let body = tokens[1].strip_suffix(':').ok_or_else(malformed)?;
    let original = tokens[tokens.len() - 5].strip_suffix(',').ok_or_else(malformed)?;
    let adjusted = tokens[tokens.len() - 1];
    Ok(BodyMassAdjustment {
        body: body.to_string(),
        original: number(original, line_no, "original mass")?,
        adjusted: number(adjusted, line_no, "new mass")?,
    })
}

/// Scalar mass change: final token of the last mass change line.
///
/// # Errors
///
/// Returns `LogParse` if there is no such line or the token is not a number
pub fn parse_mass_change(log: &str) -> Result<f64> {
    let (idx, line) = log
        .lines()
        .enumerate()
        .filter(|(_, l)| l.contains(TOTAL_MASS_CHANGE))
        .last()
        .ok_or_else(|| Error::LogParse(format!("`{TOTAL_MASS_CHANGE}` not found")))?;
    let token = line
        .split_whitespace()
        .last()
        .ok_or_else(|| Error::LogParse(format!("line {}: empty", idx + 1)))?;
    number(token, idx + 1, "mass change")
}
