//! RRA mass iteration against a scripted tool runner

mod common;

use common::{actuation_sto, baseline, ScriptedRunner, Step};
use osim_pipeline::config::PipelineConfig;
use osim_pipeline::model::ModelFile;
use osim_pipeline::rra::{IterationOutcome, IterationPaths, RraIterator, TextLogParser};
use osim_pipeline::tool::{ToolKind, ToolStatus};
use osim_pipeline::Error;

const TRIAL: &str = "S1_A_Walk";

fn setup(baseline_change: f64) -> (tempfile::TempDir, IterationPaths) {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join(TRIAL);
    baseline(&work, TRIAL, baseline_change);
    (dir, IterationPaths::new(work, TRIAL))
}

fn run(runner: &ScriptedRunner, config: &PipelineConfig, paths: &IterationPaths) -> IterationOutcome {
    RraIterator::new(runner, &TextLogParser, config)
        .run(paths)
        .unwrap()
}

fn report_rows(paths: &IterationPaths) -> Vec<Vec<String>> {
    let text = std::fs::read_to_string(paths.report()).unwrap();
    text.lines()
        .skip(2)
        .filter(|l| !l.is_empty())
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

#[test]
fn test_small_mass_change_converges_without_further_runs() {
    let (_dir, paths) = setup(0.2);
    let runner = ScriptedRunner::new(&[Step::Pass(0.008)]);
    let outcome = run(&runner, &PipelineConfig::default(), &paths);

    assert_eq!(
        outcome,
        IterationOutcome::Converged {
            runs: 1,
            mass_change: 0.008
        }
    );
    assert_eq!(runner.launch_count(ToolKind::Rra), 1);

    let rows = report_rows(&paths);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.len() == 73));
    assert_eq!(rows[0][0], "0");
    assert_eq!(rows[1][0], "1");
    assert!(!paths.adjusted_model().exists());
}

#[test]
fn test_large_mass_change_keeps_iterating() {
    let (_dir, paths) = setup(0.2);
    let runner = ScriptedRunner::new(&[Step::Pass(0.05), Step::Pass(0.004)]);
    let outcome = run(&runner, &PipelineConfig::default(), &paths);

    assert!(outcome.converged());
    assert_eq!(runner.launch_count(ToolKind::Rra), 2);
    assert_eq!(report_rows(&paths).len(), 3);
}

#[test]
fn test_iterations_run_the_iteration_setup() {
    let (_dir, paths) = setup(0.2);
    let runner = ScriptedRunner::new(&[Step::Pass(0.001)]);
    run(&runner, &PipelineConfig::default(), &paths);

    let launch = &runner.launches()[0];
    assert_eq!(
        launch.setup_file.to_string_lossy(),
        format!("{TRIAL}__Setup_RRA_Iterations.xml")
    );
    let setup = std::fs::read_to_string(paths.iteration_setup()).unwrap();
    assert!(setup.contains(&paths.model().display().to_string()));
}

#[test]
fn test_model_carries_recommended_masses() {
    let (_dir, paths) = setup(0.2);
    let runner = ScriptedRunner::new(&[Step::Pass(0.001)]);
    run(&runner, &PipelineConfig::default(), &paths);

    let model = ModelFile::load(paths.model()).unwrap();
    let masses = model.body_masses().unwrap();
    assert_eq!(masses.len(), 12);
    let (name, pelvis) = &masses[0];
    assert_eq!(name, "pelvis");
    assert!((pelvis - 10.01).abs() < 1e-9);
}

#[test]
fn test_budget_exhaustion_is_not_converged() {
    let (_dir, paths) = setup(0.2);
    let mut config = PipelineConfig::default();
    config.iteration.max_iterations = 3;
    let runner = ScriptedRunner::new(&[Step::Pass(0.05), Step::Pass(0.04), Step::Pass(0.03)]);
    let outcome = run(&runner, &config, &paths);

    assert_eq!(
        outcome,
        IterationOutcome::NotConverged {
            runs: 3,
            mass_change: 0.03
        }
    );
    assert!(!outcome.converged());
    assert_eq!(runner.launch_count(ToolKind::Rra), 3);
    let rows = report_rows(&paths);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3][0], "3");
}

#[test]
fn test_converged_after_last_budgeted_run() {
    let (_dir, paths) = setup(0.2);
    let mut config = PipelineConfig::default();
    config.iteration.max_iterations = 2;
    let runner = ScriptedRunner::new(&[Step::Pass(0.05), Step::Pass(0.002)]);
    let outcome = run(&runner, &config, &paths);
    assert_eq!(
        outcome,
        IterationOutcome::Converged {
            runs: 2,
            mass_change: 0.002
        }
    );
}

#[test]
fn test_tool_failure_stops_without_retry() {
    let (_dir, paths) = setup(0.2);
    let runner = ScriptedRunner::new(&[Step::Stop(ToolStatus::Failed)]);
    let outcome = run(&runner, &PipelineConfig::default(), &paths);

    assert_eq!(
        outcome,
        IterationOutcome::Failed {
            iteration: 1,
            status: ToolStatus::Failed
        }
    );
    assert_eq!(runner.launch_count(ToolKind::Rra), 1);
    assert_eq!(report_rows(&paths).len(), 1);
}

#[test]
fn test_timeout_is_a_failed_outcome() {
    let (_dir, paths) = setup(0.2);
    let runner = ScriptedRunner::new(&[Step::Pass(0.05), Step::Stop(ToolStatus::TimedOut)]);
    let outcome = run(&runner, &PipelineConfig::default(), &paths);
    assert_eq!(
        outcome,
        IterationOutcome::Failed {
            iteration: 2,
            status: ToolStatus::TimedOut
        }
    );
}

#[test]
fn test_unparseable_log_is_an_error() {
    let (_dir, paths) = setup(0.2);
    let log = std::fs::read_to_string(paths.log()).unwrap();
    std::fs::write(paths.log(), log.replace("Note: Edit the model", "Note: see above")).unwrap();
    let runner = ScriptedRunner::new(&[]);
    let err = RraIterator::new(&runner, &TextLogParser, &PipelineConfig::default())
        .run(&paths)
        .unwrap_err();
    assert!(matches!(err, Error::LogParse(_)));
    assert!(runner.launches().is_empty());
}

#[test]
fn test_missing_body_is_a_config_mismatch() {
    let (_dir, paths) = setup(0.2);
    let mut config = PipelineConfig::default();
    config.bodies.push("humerus_r".to_string());
    let runner = ScriptedRunner::new(&[]);
    let err = RraIterator::new(&runner, &TextLogParser, &config)
        .run(&paths)
        .unwrap_err();
    assert!(format!("{err}").contains("humerus_r"));
}

#[test]
fn test_residuals_without_samples_are_a_numeric_error() {
    let (_dir, paths) = setup(0.2);
    let residuals = paths.dir().join(format!("{TRIAL}_RRA_Actuation_force.sto"));
    std::fs::write(&residuals, actuation_sto(0)).unwrap();
    let runner = ScriptedRunner::new(&[]);
    let err = RraIterator::new(&runner, &TextLogParser, &PipelineConfig::default())
        .run(&paths)
        .unwrap_err();
    assert!(matches!(err, Error::Numeric { .. }));
    assert!(format!("{err}").contains("Actuation_force.sto"));
    assert!(runner.launches().is_empty());
}
