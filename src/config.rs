//! Pipeline configuration
//!
//! Loaded from JSON; every field falls back to the values the lab pipeline
//! has always run with, so an empty `{}` file is a valid configuration.
//!
//! ```rust
//! use osim_pipeline::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{ "workers": 4 }"#)?;
//! assert_eq!(config.workers, 4);
//! assert_eq!(config.iteration.max_iterations, 7);
//! # Ok::<(), osim_pipeline::Error>(())
//! ```

use crate::tool::ToolKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bodies of the gait models, in report column order.
pub const DEFAULT_BODIES: [&str; 12] = [
    "pelvis", "femur_r", "tibia_r", "talus_r", "calcn_r", "toes_r", "femur_l", "tibia_l",
    "talus_l", "calcn_l", "toes_l", "torso",
];

/// Residual actuators in the RRA actuation output (forces then moments).
pub const DEFAULT_RESIDUALS: [&str; 6] = ["FX", "FY", "FZ", "MX", "MY", "MZ"];

/// Translational pelvis coordinates (position errors reported in cm).
pub const DEFAULT_TRANSLATIONAL: [&str; 3] = ["pelvis_tz", "pelvis_tx", "pelvis_ty"];

/// Rotational coordinates tracked by RRA (position errors reported in degrees).
pub const DEFAULT_ROTATIONAL: [&str; 16] = [
    "pelvis_tilt",
    "pelvis_list",
    "pelvis_rotation",
    "hip_flexion_r",
    "hip_adduction_r",
    "hip_rotation_r",
    "knee_angle_r",
    "ankle_angle_r",
    "hip_flexion_l",
    "hip_adduction_l",
    "hip_rotation_l",
    "knee_angle_l",
    "ankle_angle_l",
    "lumbar_extension",
    "lumbar_bending",
    "lumbar_rotation",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Convergence settings for the RRA mass iteration. Fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Iteration budget
    pub max_iterations: u32,
    /// Suggested total mass change (kg) at or below which RRA has converged
    pub tolerance: f64,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 7,
            tolerance: 0.01,
        }
    }
}

/// Poll timing for one external tool, in milliseconds.
///
/// The default is the timing of the quick tools (Scale, IK, ID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolTiming {
    /// Delay between artifact checks
    pub poll_interval_ms: u64,
    /// Give up after this long
    pub timeout_ms: u64,
    /// Pause after the artifact shows up, so the tool can finish writing
    pub settle_ms: u64,
}

impl Default for ToolTiming {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            timeout_ms: 120_000,
            settle_ms: 1_000,
        }
    }
}

impl ToolTiming {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Settle pause as a `Duration`.
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Timing for every tool.
///
/// A tool entry in JSON may set any subset of its fields; the rest keep
/// that tool's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TimingOverrides")]
pub struct ToolTimings {
    /// Scale tool
    pub scale: ToolTiming,
    /// Inverse kinematics
    pub ik: ToolTiming,
    /// Inverse dynamics
    pub id: ToolTiming,
    /// Residual reduction
    pub rra: ToolTiming,
    /// Computed muscle control
    pub cmc: ToolTiming,
}

impl Default for ToolTimings {
    fn default() -> Self {
        let fast = ToolTiming::default();
        Self {
            scale: fast,
            ik: fast,
            id: fast,
            rra: ToolTiming {
                poll_interval_ms: 5_000,
                timeout_ms: 120_000,
                settle_ms: 5_000,
            },
            cmc: ToolTiming {
                poll_interval_ms: 15_000,
                timeout_ms: 3 * 60 * 60 * 1_000,
                settle_ms: 3_000,
            },
        }
    }
}

/// Fields given for one tool in JSON.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct TimingOverride {
    poll_interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
    settle_ms: Option<u64>,
}

impl TimingOverride {
    fn over(self, base: ToolTiming) -> ToolTiming {
        ToolTiming {
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
            settle_ms: self.settle_ms.unwrap_or(base.settle_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct TimingOverrides {
    scale: TimingOverride,
    ik: TimingOverride,
    id: TimingOverride,
    rra: TimingOverride,
    cmc: TimingOverride,
}

impl From<TimingOverrides> for ToolTimings {
    fn from(overrides: TimingOverrides) -> Self {
        let base = Self::default();
        Self {
            scale: overrides.scale.over(base.scale),
            ik: overrides.ik.over(base.ik),
            id: overrides.id.over(base.id),
            rra: overrides.rra.over(base.rra),
            cmc: overrides.cmc.over(base.cmc),
        }
    }
}

impl ToolTimings {
    /// Timing for `kind`.
    #[must_use]
    pub const fn get(&self, kind: ToolKind) -> &ToolTiming {
        match kind {
            ToolKind::Scale => &self.scale,
            ToolKind::Ik => &self.ik,
            ToolKind::Id => &self.id,
            ToolKind::Rra => &self.rra,
            ToolKind::Cmc => &self.cmc,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding one sub-directory per subject
    pub subjects_root: PathBuf,
    /// Directory holding the tool executables (`None` = resolve via `PATH`)
    pub tool_dir: Option<PathBuf>,
    /// Concurrent trial workers
    pub workers: usize,
    /// Pause after each trial's pipeline so the tools release file handles
    pub settle_delay_ms: u64,
    /// RRA mass iteration
    pub iteration: IterationConfig,
    /// Per-tool poll timing
    pub tools: ToolTimings,
    /// Model bodies, in report column order
    pub bodies: Vec<String>,
    /// Residual actuator columns (FX FY FZ MX MY MZ)
    pub residual_actuators: Vec<String>,
    /// Translational coordinates (m → cm)
    pub translational_coordinates: Vec<String>,
    /// Rotational coordinates (rad → deg)
    pub rotational_coordinates: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subjects_root: PathBuf::from("Subjects"),
            tool_dir: None,
            workers: 10,
            settle_delay_ms: 10_000,
            iteration: IterationConfig::default(),
            tools: ToolTimings::default(),
            bodies: strings(&DEFAULT_BODIES),
            residual_actuators: strings(&DEFAULT_RESIDUALS),
            translational_coordinates: strings(&DEFAULT_TRANSLATIONAL),
            rotational_coordinates: strings(&DEFAULT_ROTATIONAL),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on malformed JSON or invalid values
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("{e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.iteration.max_iterations == 0 {
            return Err(Error::Config(
                "iteration.max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.iteration.tolerance > 0.0 && self.iteration.tolerance.is_finite()) {
            return Err(Error::Config(format!(
                "iteration.tolerance must be positive, got {}",
                self.iteration.tolerance
            )));
        }
        if self.bodies.is_empty() {
            return Err(Error::Config("bodies must not be empty".to_string()));
        }
        if self.residual_actuators.len() != 6 {
            return Err(Error::Config(format!(
                "residual_actuators needs 6 columns (FX FY FZ MX MY MZ), got {}",
                self.residual_actuators.len()
            )));
        }
        for kind in ToolKind::ALL {
            let timing = self.tools.get(kind);
            if timing.poll_interval_ms == 0 || timing.timeout_ms == 0 {
                return Err(Error::Config(format!(
                    "tools.{}: poll interval and timeout must be non-zero",
                    kind.command()
                )));
            }
        }
        Ok(())
    }

    /// Directory of `subject`.
    #[must_use]
    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.subjects_root.join(subject)
    }

    /// Settle delay after each trial.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
