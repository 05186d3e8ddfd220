//! Result post-processing
//!
//! Loads a finished trial's outputs into [`DataTable`](crate::storage::DataTable)s,
//! resamples muscle forces onto a 101-point percent-of-cycle axis, and
//! aggregates them over a cohort.
//!
//! ## Components
//!
//! - [`markers`]: `.trc` marker trajectories
//! - [`grf`]: force-plate records, channel renaming, COP sentinel masking
//! - [`spline`]: not-a-knot cubic spline and cycle normalisation
//! - [`simulation`]: one trial's outputs and its normalised muscle forces
//! - [`group`]: cohort mean and standard deviation per cycle type

pub mod grf;
pub mod group;
pub mod markers;
pub mod simulation;
pub mod spline;

pub use grf::{mask_cop_sentinels, GroundReaction};
pub use group::{aggregate_cycle, aggregate_group, GroupSummary, MissingMember};
pub use markers::MarkerData;
pub use simulation::{load_muscle_forces, DynamicsOutputs, Leg, Simulation, PERCENT_CYCLE};
pub use spline::{normalize_cycle, CubicSpline, CYCLE_POINTS};
