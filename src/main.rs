use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod grading;
mod input;
mod models;
mod report;

use crate::config::Settings;
use crate::models::GradeInput;

#[derive(Parser)]
#[command(name = "learner-grade-summary")]
#[command(about = "Per-learner grade summaries for a Group Scholar assignment group", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate submissions into per-learner JSON summaries
    Summarize {
        /// JSON file with course, assignment_group and submissions
        #[arg(long)]
        input: PathBuf,
        /// Extra submissions to grade, as CSV
        #[arg(long)]
        submissions_csv: Option<PathBuf>,
        /// Reference time for due dates (defaults to GRADE_SUMMARY_NOW, then the clock)
        #[arg(long)]
        now: Option<String>,
        /// Write JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        submissions_csv: Option<PathBuf>,
        #[arg(long)]
        now: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the sample course, assignment group and submissions as JSON
    Sample {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Summarize {
            input,
            submissions_csv,
            now,
            out,
        } => {
            let settings = Settings::resolve(now)?;
            let input = gather_input(&input, submissions_csv.as_deref())?;
            let aggregation = grading::aggregate(
                &input.course,
                &input.assignment_group,
                &input.submissions,
                settings.now,
            )
            .context("failed to aggregate grades")?;

            if !aggregation.diagnostics.is_empty() {
                warn!(
                    skipped = aggregation.diagnostics.len(),
                    "some submissions were skipped"
                );
            }

            let json = report::summaries_to_json(&aggregation.summaries)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!(
                        "Wrote {} learner summaries to {}.",
                        aggregation.summaries.len(),
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
        }
        Commands::Report {
            input,
            submissions_csv,
            now,
            out,
        } => {
            let settings = Settings::resolve(now)?;
            let input = gather_input(&input, submissions_csv.as_deref())?;
            let aggregation = grading::aggregate(
                &input.course,
                &input.assignment_group,
                &input.submissions,
                settings.now,
            )
            .context("failed to aggregate grades")?;

            let report = report::build_report(&input, &aggregation, settings.now);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Sample { out } => {
            let json = serde_json::to_string_pretty(&input::sample_input())?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Sample input written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}

/// CSV submissions are graded after the ones embedded in the JSON input.
fn gather_input(path: &Path, submissions_csv: Option<&Path>) -> anyhow::Result<GradeInput> {
    let mut input = input::load_input(path)?;
    if let Some(csv_path) = submissions_csv {
        let extra = input::load_submissions_csv(csv_path)?;
        info!(added = extra.len(), "appending CSV submissions");
        input.submissions.extend(extra);
    }
    Ok(input)
}
