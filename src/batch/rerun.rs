//! CMC re-run after a late optimizer crash
//!
//! CMC sometimes stops with `could not find a solution at time = <t>.`
//! close to the end of the cycle. When the crash came after the last
//! cycle event, moving `final_time` just past the crash still covers the
//! whole cycle, so the trial is worth re-running.

use super::pipeline::TrialPipeline;
use crate::layout::TrialLayout;
use crate::model::{SetupField, SetupFile};
use crate::results::grf::cycle_line;
use crate::tool::poller::log_tail;
use crate::tool::{ToolKind, ToolReport};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Crash marker in the CMC log.
pub const CRASH_MARKER: &str = "could not find a solution";
/// Log lines searched for the marker.
const CRASH_TAIL_LINES: usize = 7;
/// Line of the GRF record holding the cycle event times.
const CYCLE_TIMES_LINE: usize = 11;
/// The optimizer's last good step precedes the crash by this much.
const OPTIMIZER_STEP: f64 = 0.001;
/// New final time past the crash.
const FINAL_TIME_MARGIN: f64 = 0.009;

/// What to do about a trial whose CMC run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RerunDecision {
    /// CMC output exists, or RRA never finished: nothing to do
    NotApplicable,
    /// The log has no crash marker
    NoCrash,
    /// Crashed before the cycle ended; needs manual attention
    Stop {
        /// Time of the crash
        crash_time: f64,
        /// Last cycle event time
        last_cycle_time: f64,
    },
    /// Setup updated; re-run with this final time
    Rerun {
        /// Time of the crash
        crash_time: f64,
        /// New `final_time`
        final_time: f64,
    },
}

/// Crash time in the last lines of a CMC log.
#[must_use]
pub fn crash_time(tail: &[String]) -> Option<f64> {
    tail.iter()
        .filter(|line| line.contains(CRASH_MARKER))
        .find_map(|line| {
            let (_, value) = line.rsplit_once("= ")?;
            value.trim().trim_end_matches('.').parse::<f64>().ok()
        })
}

fn last_cycle_time(grf: &Path) -> Result<f64> {
    let text = std::fs::read_to_string(grf)?;
    let lines: Vec<&str> = text.lines().collect();
    cycle_line(grf, &lines, CYCLE_TIMES_LINE)?
        .last()
        .copied()
        .ok_or_else(|| Error::numeric(grf, format!("line {CYCLE_TIMES_LINE}: no cycle times")))
}

/// Decide whether `layout`'s CMC run can be re-run, updating the CMC setup's
/// `final_time` when it can.
///
/// # Errors
///
/// Returns error if the GRF record or CMC setup cannot be read or written
pub fn plan_cmc_rerun(layout: &TrialLayout) -> Result<RerunDecision> {
    if layout.file("_CMC_Kinematics_q.sto").exists()
        || !layout.file("_RRA_Kinematics_q.sto").exists()
    {
        return Ok(RerunDecision::NotApplicable);
    }
    let tail = log_tail(&layout.file("_CMC.log"), CRASH_TAIL_LINES);
    let Some(crash_time) = crash_time(&tail) else {
        return Ok(RerunDecision::NoCrash);
    };

    let last_cycle_time = last_cycle_time(&layout.grf())?;
    if crash_time - OPTIMIZER_STEP < last_cycle_time {
        warn!(
            trial = layout.trial(),
            crash_time, last_cycle_time, "manually check the status of {}", layout.trial()
        );
        return Ok(RerunDecision::Stop {
            crash_time,
            last_cycle_time,
        });
    }

    let final_time = crash_time + FINAL_TIME_MARGIN;
    let mut setup = SetupFile::load(layout.setup(ToolKind::Cmc))?;
    setup.set_field(SetupField::FinalTime, 0, &format!("{final_time}"))?;
    setup.save()?;
    info!(trial = layout.trial(), crash_time, final_time, "CMC final time moved");
    Ok(RerunDecision::Rerun {
        crash_time,
        final_time,
    })
}

impl TrialPipeline<'_> {
    /// Re-run CMC for `layout` when [`plan_cmc_rerun`] allows it.
    ///
    /// # Errors
    ///
    /// Returns error if planning fails or the stage cannot be run
    pub fn rerun_cmc(&self, layout: &TrialLayout) -> Result<(RerunDecision, Option<ToolReport>)> {
        let decision = plan_cmc_rerun(layout)?;
        let report = match decision {
            RerunDecision::Rerun { .. } => Some(self.run_stage(layout, ToolKind::Cmc)?),
            _ => None,
        };
        Ok((decision, report))
    }
}
