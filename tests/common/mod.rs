//! Shared fixtures: OpenSim-shaped files and a scripted tool runner

#![allow(dead_code)]

use chrono::Utc;
use osim_pipeline::config::{DEFAULT_BODIES, DEFAULT_ROTATIONAL, DEFAULT_TRANSLATIONAL};
use osim_pipeline::tool::{ToolInvocation, ToolKind, ToolReport, ToolRunner, ToolSpec, ToolStatus};
use osim_pipeline::Result;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Original mass of body `i` in the fixtures.
pub fn original_mass(i: usize) -> f64 {
    10.0 + i as f64
}

/// RRA console log recommending `+0.01 kg` per body and `mass_change` in total.
pub fn rra_log(trial: &str, mass_change: f64) -> String {
    let mut log = format!("Running tool {trial}.\n");
    log.push_str("*  torso: new COM ~ [-0.0288,0.3188,0.0012]\n*\n");
    log.push_str("*  Recommended mass adjustments:\n");
    writeln!(log, "*  Total mass change: {mass_change}").unwrap();
    for (i, body) in DEFAULT_BODIES.iter().enumerate() {
        let m = original_mass(i);
        writeln!(log, "*  {body}: orig mass = {m}, new mass = {}", m + 0.01).unwrap();
    }
    log.push_str("*\n*  Note: Edit the model to make recommended adjustments to mass and COM.\n");
    log
}

fn preamble(lines: usize, name: &str) -> String {
    let mut text = format!("{name}\nversion=1\n");
    for i in 2..lines {
        writeln!(text, "# preamble {i}").unwrap();
    }
    text
}

/// `_RRA_Actuation_force.sto` with residual columns, header on line 23.
pub fn actuation_sto(rows: usize) -> String {
    let mut text = preamble(22, "Actuation_force");
    text.push_str("time\tFX\tFY\tFZ\tMX\tMY\tMZ\tsemimem_r\n");
    for r in 0..rows {
        let t = r as f64 * 0.01;
        writeln!(text, "{t}\t1.0\t-2.0\t0.5\t3.0\t-1.0\t0.25\t{}", 100.0 * t).unwrap();
    }
    text
}

/// `_RRA_pErr.sto` with every tracked coordinate, header on line 7.
pub fn position_error_sto(rows: usize) -> String {
    let mut text = preamble(6, "pErr");
    let names: Vec<&str> = DEFAULT_TRANSLATIONAL
        .iter()
        .chain(DEFAULT_ROTATIONAL.iter())
        .copied()
        .collect();
    writeln!(text, "time\t{}", names.join("\t")).unwrap();
    for r in 0..rows {
        let t = r as f64 * 0.01;
        let values = vec!["0.01"; names.len()].join("\t");
        writeln!(text, "{t}\t{values}").unwrap();
    }
    text
}

/// `.osim` model with the default bodies at their original masses.
pub fn model_xml(name: &str) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<OpenSimDocument Version=\"30000\">\n  <Model name=\"{name}\">\n    <BodySet>\n      <objects>\n"
    );
    for (i, body) in DEFAULT_BODIES.iter().enumerate() {
        writeln!(
            xml,
            "        <Body name=\"{body}\">\n          <mass>{}</mass>\n        </Body>",
            original_mass(i)
        )
        .unwrap();
    }
    xml.push_str("      </objects>\n    </BodySet>\n  </Model>\n</OpenSimDocument>\n");
    xml
}

/// Setup document for `kind` with every field the pipeline may rewrite.
pub fn setup_xml(kind: ToolKind, model_file: &str) -> String {
    let body = match kind {
        ToolKind::Scale => "    <output_model_file>Unassigned</output_model_file>\n    <output_model_file>Unassigned</output_model_file>\n".to_string(),
        ToolKind::Ik => "    <output_motion_file>Unassigned</output_motion_file>\n".to_string(),
        ToolKind::Id => "    <results_directory>./</results_directory>\n".to_string(),
        ToolKind::Rra => "    <results_directory>./</results_directory>\n    <final_time>1.2</final_time>\n    <output_model_file>Unassigned</output_model_file>\n".to_string(),
        ToolKind::Cmc => "    <results_directory>./</results_directory>\n    <final_time>1.2</final_time>\n".to_string(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<OpenSimDocument Version=\"30000\">\n  <{kind}Tool name=\"setup\">\n    <model_file>{model_file}</model_file>\n{body}  </{kind}Tool>\n</OpenSimDocument>\n"
    )
}

/// Write the outputs an RRA run leaves in `dir` for `trial`.
pub fn write_rra_outputs(dir: &Path, trial: &str, mass_change: f64) {
    std::fs::write(dir.join(format!("{trial}_RRA.log")), rra_log(trial, mass_change)).unwrap();
    std::fs::write(dir.join(format!("{trial}__AdjustedCOM.osim")), model_xml("adjusted")).unwrap();
    std::fs::write(dir.join(format!("{trial}_RRA_Actuation_force.sto")), actuation_sto(5)).unwrap();
    std::fs::write(dir.join(format!("{trial}_RRA_pErr.sto")), position_error_sto(5)).unwrap();
    std::fs::write(dir.join(format!("{trial}_RRA_Kinematics_q.sto")), "q\n").unwrap();
    std::fs::write(dir.join(format!("{trial}_RRA_controls.xml")), "<controls/>").unwrap();
}

/// Prepare a working directory holding a baseline RRA run and its setup.
pub fn baseline(dir: &Path, trial: &str, mass_change: f64) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(format!("{trial}__Setup_RRA.xml")),
        setup_xml(ToolKind::Rra, "S1.osim"),
    )
    .unwrap();
    write_rra_outputs(dir, trial, mass_change);
}

/// One scripted tool outcome.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Pass; an RRA run recommends this total mass change
    Pass(f64),
    /// End with this status and write nothing
    Stop(ToolStatus),
}

/// Tool runner writing canned outputs instead of launching executables.
///
/// RRA runs consume the script in order (baseline included); other tools
/// pass unless listed in `failing`.
#[derive(Default)]
pub struct ScriptedRunner {
    rra: Mutex<VecDeque<Step>>,
    failing: Vec<ToolKind>,
    launches: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new(rra: &[Step]) -> Self {
        Self {
            rra: Mutex::new(rra.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn failing(mut self, kind: ToolKind) -> Self {
        self.failing.push(kind);
        self
    }

    pub fn launches(&self) -> Vec<ToolInvocation> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launch_count(&self, kind: ToolKind) -> usize {
        self.launches().iter().filter(|i| i.kind == kind).count()
    }

    fn outcome(&self, invocation: &ToolInvocation) -> ToolStatus {
        let dir = &invocation.working_dir;
        let trial = invocation.trial.as_str();
        if self.failing.contains(&invocation.kind) {
            return ToolStatus::Failed;
        }
        match invocation.kind {
            ToolKind::Rra => match self.rra.lock().unwrap().pop_front() {
                Some(Step::Pass(mass_change)) => {
                    write_rra_outputs(dir, trial, mass_change);
                    ToolStatus::Passed
                }
                Some(Step::Stop(status)) => status,
                None => panic!("RRA launched more often than scripted"),
            },
            ToolKind::Scale => {
                std::fs::write(dir.join("TempScaled.osim"), model_xml("temp")).unwrap();
                std::fs::write(&invocation.artifact, model_xml("scaled")).unwrap();
                ToolStatus::Passed
            }
            ToolKind::Ik | ToolKind::Id => {
                std::fs::write(&invocation.artifact, "Coordinates\nversion=1\n").unwrap();
                ToolStatus::Passed
            }
            ToolKind::Cmc => {
                std::fs::write(dir.join(format!("{trial}_CMC_Kinematics_q.sto")), "q\n").unwrap();
                std::fs::write(&invocation.artifact, "<controls/>").unwrap();
                ToolStatus::Passed
            }
        }
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, invocation: &ToolInvocation, _spec: &ToolSpec) -> Result<ToolReport> {
        self.launches.lock().unwrap().push(invocation.clone());
        std::fs::write(&invocation.log_file, "").ok();
        let status = self.outcome(invocation);
        Ok(ToolReport::new(invocation, Utc::now(), Duration::from_millis(1), status))
    }
}

/// Force-plate channel headers in file order.
pub const GRF_CHANNELS: [&str; 18] = [
    "ground_forceR_vx",
    "ground_forceR_vy",
    "ground_forceR_vz",
    "ground_forceR_px",
    "ground_forceR_py",
    "ground_forceR_pz",
    "ground_forceL_vx",
    "ground_forceL_vy",
    "ground_forceL_vz",
    "ground_forceL_px",
    "ground_forceL_py",
    "ground_forceL_pz",
    "ground_torqueR_x",
    "ground_torqueR_y",
    "ground_torqueR_z",
    "ground_torqueL_x",
    "ground_torqueL_y",
    "ground_torqueL_z",
];

/// `_GRF.mot` with cycle lines 9-11 and header on line 14.
///
/// `rows` are `(time, [18 channel values])`.
pub fn grf_mot(cycle_times: &[f64], rows: &[(f64, [f64; 18])]) -> String {
    let join = |v: &[f64]| v.iter().map(f64::to_string).collect::<Vec<_>>().join("\t");
    let mut text = String::from("S1_A_Walk_GRF.mot\nversion=1\n");
    writeln!(text, "nRows={}", rows.len()).unwrap();
    text.push_str("nColumns=19\ninDegrees=yes\n# a\n# b\n# c\n");
    writeln!(text, "cycleFrames\t{}", join(&[20.0, 80.0])).unwrap();
    writeln!(text, "cycleSamples\t{}", join(&[200.0, 800.0])).unwrap();
    writeln!(text, "cycleTimes\t{}", join(cycle_times)).unwrap();
    text.push_str("# d\nendheader\n");
    writeln!(text, "time\t{}", GRF_CHANNELS.join("\t")).unwrap();
    for (t, values) in rows {
        writeln!(text, "{t}\t{}", join(values)).unwrap();
    }
    text
}

/// `_CMC_Actuation_force.sto` with constant force `force` on every muscle
/// of both legs, sampled every 10 ms over `[0, 1]`.
pub fn cmc_actuation(muscles: &[&str], force: f64) -> String {
    let mut text = preamble(22, "Actuation_force");
    let mut names = vec!["time".to_string()];
    for m in muscles {
        names.push(format!("{m}_r"));
        names.push(format!("{m}_l"));
    }
    writeln!(text, "{}", names.join("\t")).unwrap();
    for r in 0..=100 {
        let t = f64::from(r) * 0.01;
        let values = vec![force.to_string(); names.len() - 1].join("\t");
        writeln!(text, "{t}\t{values}").unwrap();
    }
    text
}

/// Subject directory holding the scale setup, GRF record and CMC forces of
/// one trial, under `root/<subject>`.
pub fn subject_results(root: &Path, subject: &str, cycle: &str, muscles: &[&str], force: f64) {
    let dir = root.join(subject);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{subject}_0_StaticPose__Setup_Scale.xml")),
        setup_xml(ToolKind::Scale, "C:\\Models\\gait2392.osim"),
    )
    .unwrap();
    let trial = format!("{subject}_{cycle}");
    let rows: Vec<(f64, [f64; 18])> = (0..=10)
        .map(|i| (f64::from(i) * 0.1, [1.0; 18]))
        .collect();
    std::fs::write(dir.join(format!("{trial}_GRF.mot")), grf_mot(&[0.2, 0.8], &rows)).unwrap();
    std::fs::write(
        dir.join(format!("{trial}_CMC_Actuation_force.sto")),
        cmc_actuation(muscles, force),
    )
    .unwrap();
}
