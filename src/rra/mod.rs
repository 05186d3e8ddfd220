//! Residual reduction (RRA) mass iteration
//!
//! RRA recommends mass changes that would shrink the residual forces. The
//! [`RraIterator`] applies them and reruns RRA until the recommended total
//! change falls within tolerance or the iteration budget is spent, keeping
//! an [`IterationReport`] of every run.
//!
//! ## Components
//!
//! - [`log`]: text log parsing behind the [`RunOutcomeParser`] seam
//! - [`stats`]: residual and position-error statistics, unit conversions
//! - [`report`]: the tab-separated iteration report
//! - [`controller`]: the convergence loop

pub mod controller;
pub mod log;
pub mod report;
pub mod stats;

pub use controller::{ConvergenceState, IterationOutcome, IterationPaths, RraIterator};
pub use log::{BodyMassAdjustment, MassAdjustment, RunOutcomeParser, TextLogParser};
pub use report::{IterationRecord, IterationReport, ReportLayout};
pub use stats::{PositionErrorStats, ResidualStats};
