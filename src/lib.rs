//! # osim-pipeline: batch OpenSim gait simulations
//!
//! Drives the OpenSim command-line tools (Scale, IK, ID, RRA, CMC) over a
//! cohort of subjects and trials, and iterates RRA's recommended mass
//! adjustments until the residual-reducing model converges.
//!
//! ## Pipeline
//!
//! ```text
//! subject ─▶ Scale ─┬─ trial 1 ─▶ IK → ID → RRA → mass iteration → CMC
//!                   ├─ trial 2 ─▶ ...                      (worker pool)
//!                   └─ trial n ─▶ ...
//! results ─▶ normalise muscle forces to % cycle ─▶ cohort mean / std
//! ```
//!
//! The tools report nothing through exit codes. A run is complete when
//! its expected artifact appears, failed when its log says so, and timed
//! out otherwise. Each trial ends `Converged`, `NotConverged` or `Failed`,
//! and a batch ends with a tally of the three.
//!
//! ## Example
//!
//! ```rust,no_run
//! use osim_pipeline::config::PipelineConfig;
//! use osim_pipeline::layout::TrialLayout;
//! use osim_pipeline::rra::{IterationPaths, RraIterator, TextLogParser};
//! use osim_pipeline::tool::ProcessRunner;
//!
//! let config = PipelineConfig::load("pipeline.json")?;
//! let layout = TrialLayout::new(config.subject_dir("20130221CONF"), "20130221CONF_A_Walk_RepGRF");
//! let outcome = RraIterator::new(&ProcessRunner::new(), &TextLogParser, &config)
//!     .run(&IterationPaths::in_working_dir(&layout))?;
//! println!("{outcome:?}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod audit;
pub mod batch;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod motfile;
pub mod results;
pub mod rra;
pub mod storage;
pub mod tool;

pub use error::{Error, Result};
