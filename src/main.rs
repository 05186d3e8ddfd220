//! `osim-pipeline` command line
//!
//! - `run`: scale and simulate every trial of the given subjects
//! - `iterate-rra`: run the RRA mass iteration for one trial
//! - `rerun-cmc`: re-run CMC for trials that crashed near the cycle end
//! - `process`: normalise one trial's muscle forces and export them
//! - `group`: cohort mean and standard deviation per cycle type
//! - `audit`: list missing files per stage

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use osim_pipeline::audit;
use osim_pipeline::batch::{BatchDriver, RerunDecision, TrialPipeline};
use osim_pipeline::config::PipelineConfig;
use osim_pipeline::layout::{discover_trials, TrialLayout};
use osim_pipeline::results::{aggregate_group, Simulation};
use osim_pipeline::rra::{IterationPaths, RraIterator, TextLogParser};
use osim_pipeline::tool::ProcessRunner;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

/// Batch OpenSim simulation pipeline.
#[derive(Parser)]
#[command(name = "osim-pipeline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured subjects directory
    #[arg(long, global = true)]
    subjects_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scale and simulate every trial of the given subjects
    Run {
        /// Subject ids
        #[arg(required = true)]
        subjects: Vec<String>,

        /// Write the batch summary here as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Run the RRA mass iteration for one trial in its subject directory
    IterateRra {
        /// Subject id
        subject: String,

        /// Trial name
        trial: String,
    },

    /// Re-run CMC for trials whose optimizer crashed after the cycle end
    RerunCmc {
        /// Subject id
        subject: String,
    },

    /// Normalise one trial's muscle forces and export them as Parquet
    Process {
        /// Subject id
        subject: String,

        /// Trial name
        trial: String,

        /// Output file (default `<trial>_MuscleForces.parquet` in the subject directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Cohort mean and standard deviation of normalised muscle forces
    Group {
        /// Subject ids in the cohort
        #[arg(long, num_args = 1.., required = true)]
        subjects: Vec<String>,

        /// Cycle types (trial descriptors, e.g. `A_Walk_RepGRF`)
        #[arg(long, num_args = 1.., required = true)]
        cycles: Vec<String>,

        /// Directory receiving one `<cycle>_group.parquet` per cycle
        #[arg(long)]
        out_dir: PathBuf,
    },

    /// List expected files missing from subject directories
    Audit {
        /// Subject ids
        #[arg(required = true)]
        subjects: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = &cli.subjects_root {
        config.subjects_root.clone_from(root);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let runner = ProcessRunner::with_tool_dir(config.tool_dir.clone());
    let parser = TextLogParser;

    match cli.command {
        Commands::Run { subjects, summary } => {
            let driver = BatchDriver::new(&runner, &parser, &config);
            let batch = driver.run_subjects(&subjects)?;
            if let Some(path) = summary {
                std::fs::write(&path, batch.to_json()?)
                    .with_context(|| format!("writing summary {}", path.display()))?;
            }
            let tally = batch.tally();
            println!(
                "converged: {}  not converged: {}  failed: {}",
                tally.converged, tally.not_converged, tally.failed
            );
            for run in batch.failures() {
                println!("  {}: {}", run.trial(), run.message().unwrap_or("failed"));
            }
            Ok(if tally.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::IterateRra { subject, trial } => {
            let paths = IterationPaths::new(config.subject_dir(&subject), trial);
            let outcome = RraIterator::new(&runner, &parser, &config).run(&paths)?;
            println!("{}: {outcome:?}", paths.trial());
            Ok(if outcome.converged() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::RerunCmc { subject } => {
            let subject_dir = config.subject_dir(&subject);
            let pipeline = TrialPipeline::new(&runner, &parser, &config);
            let mut failed = 0;
            for trial in discover_trials(&subject_dir, &subject)? {
                let layout = TrialLayout::new(&subject_dir, trial.as_str());
                match pipeline.rerun_cmc(&layout)? {
                    (RerunDecision::Rerun { final_time, .. }, Some(report)) => {
                        info!(trial = %trial, final_time, status = %report.status, "CMC re-run finished");
                        if !report.status.passed() {
                            failed += 1;
                        }
                    }
                    (RerunDecision::Stop { .. }, _) => failed += 1,
                    _ => {}
                }
            }
            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Process {
            subject,
            trial,
            out,
        } => {
            let subject_dir = config.subject_dir(&subject);
            let simulation = Simulation::load(&subject_dir, &trial)
                .with_context(|| format!("loading results of {trial}"))?;
            let Some(forces) = simulation.muscle_forces else {
                bail!("{trial} has no CMC output to normalise");
            };
            let out = out.unwrap_or_else(|| {
                TrialLayout::new(&subject_dir, trial.as_str()).file("_MuscleForces.parquet")
            });
            forces.write_parquet(&out)?;
            println!(
                "{trial} ({} leg, {} model) → {}",
                simulation.leg,
                simulation.model,
                out.display()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Group {
            subjects,
            cycles,
            out_dir,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            let mut empty = 0;
            for summary in aggregate_group(&config.subjects_root, &subjects, &cycles)? {
                let path = out_dir.join(format!("{}_group.parquet", summary.cycle));
                if summary.write_parquet(&path)? {
                    println!(
                        "{}: {} subjects → {}",
                        summary.cycle,
                        summary.members.len(),
                        path.display()
                    );
                } else {
                    warn!(cycle = %summary.cycle, "no subject available");
                    empty += 1;
                }
                if !summary.missing.is_empty() {
                    println!("  missing: {}", summary.missing_subjects().join(", "));
                }
            }
            Ok(if empty == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Audit { subjects } => {
            let mut total = 0;
            for subject in &subjects {
                let missing = audit::audit_subject(&config.subject_dir(subject), subject)?;
                for m in &missing {
                    println!("{subject} [{}] {} is missing", m.stage, m.file);
                }
                total += missing.len();
            }
            Ok(if total == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_group() {
        let cli = Cli::parse_from([
            "osim-pipeline",
            "group",
            "--subjects",
            "A",
            "B",
            "--cycles",
            "A_Walk_RepGRF",
            "--out-dir",
            "out",
        ]);
        match cli.command {
            Commands::Group { subjects, cycles, .. } => {
                assert_eq!(subjects, vec!["A", "B"]);
                assert_eq!(cycles, vec!["A_Walk_RepGRF"]);
            }
            _ => panic!("expected group"),
        }
    }
}
