//! F1 Predictor CLI - Command-line interface for race predictions

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use f1_predictor::data::load_races;
use f1_predictor::models::{PredictResponse, RaceInput};
use f1_predictor::pipeline::Pipeline;
use f1_predictor::Prediction;

/// Default artifact path (relative to project root)
const DEFAULT_ARTIFACT: &str = "models/sample_pipeline.json";

#[derive(Parser)]
#[command(name = "f1-predictor")]
#[command(author, version, about = "F1 race result prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict finishing order for one or more races
    Predict {
        /// Pipeline artifact file
        #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_ARTIFACT)]
        artifact: PathBuf,

        /// Race input (.json with one race or an array, or .csv with one row per entrant)
        #[arg(short, long)]
        input: PathBuf,

        /// Number of top entrants to show per race
        #[arg(long, default_value = "20")]
        top: usize,

        /// Print predictions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show artifact metadata, schema fields and model input columns
    Inspect {
        /// Pipeline artifact file
        #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_ARTIFACT)]
        artifact: PathBuf,

        /// Require this artifact version
        #[arg(long = "version", value_name = "VERSION")]
        pinned: Option<String>,
    },

    /// Check race inputs against the artifact schema without predicting
    Validate {
        /// Pipeline artifact file
        #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_ARTIFACT)]
        artifact: PathBuf,

        /// Race input (.json or .csv)
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let quiet = matches!(cli.command, Commands::Predict { json: true, .. });
    if !quiet {
        println!("{}", format!("F1 Predictor CLI v{}", env!("CARGO_PKG_VERSION")).cyan().bold());
        println!();
    }

    match cli.command {
        Commands::Predict {
            artifact,
            input,
            top,
            json,
        } => predict(&artifact, &input, top, json),
        Commands::Inspect { artifact, pinned } => inspect(&artifact, pinned.as_deref()),
        Commands::Validate { artifact, input } => validate(&artifact, &input),
    }
}

fn load_pipeline(artifact: &Path, version: Option<&str>) -> Result<Pipeline> {
    let pipeline = match version {
        Some(v) => Pipeline::load_version(artifact, v),
        None => Pipeline::load(artifact),
    };
    pipeline.with_context(|| format!("Failed to load artifact {:?}", artifact))
}

fn load_input(input: &Path) -> Result<Vec<RaceInput>> {
    let races = load_races(input).with_context(|| format!("Failed to load races from {:?}", input))?;
    if races.is_empty() {
        bail!("No races found in {:?}", input);
    }
    Ok(races)
}

fn predict(artifact: &Path, input: &Path, top: usize, json: bool) -> Result<()> {
    let pipeline = load_pipeline(artifact, None)?;
    let races = load_input(input)?;

    if json {
        let predictions = pipeline.predict_batch(&races)?;
        let responses: Vec<PredictResponse> =
            predictions.into_iter().map(PredictResponse::from).collect();
        println!("{}", serde_json::to_string_pretty(&responses)?);
        return Ok(());
    }

    println!(
        "{}: {} race(s) with {} v{}",
        "Predicting".green(),
        races.len(),
        pipeline.metadata().name,
        pipeline.version()
    );
    println!();

    let pb = ProgressBar::new(races.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut predictions = Vec::with_capacity(races.len());
    for race in &races {
        pb.set_message(race.label());
        let prediction = pipeline
            .predict(race)
            .with_context(|| format!("Prediction failed for {}", race.label()))?;
        predictions.push(prediction);
        pb.inc(1);
    }
    pb.finish_and_clear();

    for (race, prediction) in races.iter().zip(&predictions) {
        print_prediction(race, prediction, top);
    }

    Ok(())
}

fn print_prediction(race: &RaceInput, prediction: &Prediction, top: usize) {
    println!("{}", race.label().yellow().bold());
    println!(
        "{:>4} {:<18} {:<16} {:>5} {:>10} {:>8}",
        "Pos", "Driver", "Constructor", "Grid", "Score", "Prob"
    );
    println!("{}", "-".repeat(66));

    let mut rows: Vec<_> = prediction.entrants.iter().zip(&race.entrants).collect();
    rows.sort_by_key(|(p, _)| p.predicted_rank);

    for (p, entrant) in rows.into_iter().take(top) {
        let grid = entrant
            .grid
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".to_string());
        let probability = p
            .probability
            .map(|v| format!("{:.1}%", v * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let position = format!("P{}", p.predicted_rank);

        println!(
            "{:>4} {:<18} {:<16} {:>5} {:>10.3} {:>8}",
            if p.predicted_rank == 1 { position.green().bold() } else { position.normal() },
            truncate_name(&p.driver_id, 18),
            truncate_name(&p.constructor_id, 16),
            grid,
            p.score,
            probability
        );
    }
    println!();
}

fn inspect(artifact: &Path, version: Option<&str>) -> Result<()> {
    let pipeline = load_pipeline(artifact, version)?;
    let meta = pipeline.metadata();

    println!("{}", "Artifact:".yellow().bold());
    println!("  {:<16} {}", "Name", meta.name);
    println!("  {:<16} {}", "Version", meta.version);
    println!("  {:<16} {}", "Schema version", meta.schema_version);
    println!("  {:<16} {}", "Model", meta.model_kind);
    println!("  {:<16} {}", "Objective", meta.objective.as_str());
    if let Some(created_at) = meta.created_at {
        println!("  {:<16} {}", "Created", created_at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(description) = &meta.description {
        println!("  {:<16} {}", "Description", description);
    }
    println!("  {:<16} {:?}", "Source", meta.source);
    println!();

    println!("{}", "Schema fields:".yellow().bold());
    println!("{:<24} {:<12} {:<8} {:>8} {:>8}", "Name", "Kind", "Scope", "Min", "Max");
    println!("{}", "-".repeat(64));
    for field in &pipeline.schema().fields {
        let bound = |b: Option<f64>| b.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<12} {:<8} {:>8} {:>8}",
            truncate_name(&field.name, 24),
            field.kind.as_str(),
            field.scope.as_str(),
            bound(field.min),
            bound(field.max)
        );
    }
    println!();

    println!(
        "{} ({})",
        "Model input columns:".yellow().bold(),
        pipeline.feature_names().len()
    );
    for (i, name) in pipeline.feature_names().iter().enumerate() {
        println!("  {:>3}  {}", i, name);
    }

    Ok(())
}

fn validate(artifact: &Path, input: &Path) -> Result<()> {
    let pipeline = load_pipeline(artifact, None)?;
    let races = load_input(input)?;

    let mut invalid = 0;
    for race in &races {
        match pipeline.validate(race) {
            Ok(()) => println!("{} {}", "✓".green(), race.label()),
            Err(err) => {
                invalid += 1;
                println!("{} {}", "✗".red(), race.label());
                for issue in &err.issues {
                    println!("    {}", issue.to_string().dimmed());
                }
            }
        }
    }
    println!();

    if invalid > 0 {
        bail!("{} of {} race(s) failed validation", invalid, races.len());
    }
    println!("{}", format!("All {} race(s) valid", races.len()).green());
    Ok(())
}

/// Fit an identifier into a table column, marking cut names with an ellipsis
fn truncate_name(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let mut cut: String = name.chars().take(width.saturating_sub(1)).collect();
    if width > 0 {
        cut.push('…');
    }
    cut
}
