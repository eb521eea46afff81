use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use lactrs::config::AppConfig;
use lactrs::display;
use lactrs::export::{self, ExportFormat, TestReport};
use lactrs::identity::Identity;
use lactrs::import::validation::{parse_metric_pairs, StageEntry, StageEntryValidator};
use lactrs::import::{import_file, import_reader, ImportOutcome};
use lactrs::logging::{init_logging, LogFormat, LogLevel};
use lactrs::reconcile::{merge_saved_point, next_stage_index, reconcile_points};
use lactrs::{
    LactrsError, NewTest, PointStore, SessionSummary, SqliteStore, StagePoint, SummaryBuilder,
    ThresholdEstimate, ThresholdEstimator,
};

/// lactrs - Lactate Threshold Test CLI
///
/// Record graded running tests stage by stage, estimate LT1/LT2 from the
/// lactate curve and summarize the session.
#[derive(Parser)]
#[command(name = "lactrs")]
#[command(author = "lactrs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Lactate threshold test CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format (pretty, json, compact)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new lactate test
    New {
        /// Test title
        #[arg(short, long)]
        title: Option<String>,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Planned number of stages (defaults to the configured protocol)
        #[arg(long)]
        stages: Option<u32>,

        /// Stage length in seconds (defaults to the configured protocol)
        #[arg(long)]
        stage_seconds: Option<u32>,
    },

    /// List your lactate tests
    List,

    /// Show a test with its stages, thresholds and summary
    Show {
        test_id: String,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record or replace one stage
    Add {
        test_id: String,

        /// Stage index, 0 is the baseline (defaults to the next stage)
        #[arg(short, long, allow_negative_numbers = true)]
        stage: Option<i64>,

        /// Pace as mm:ss per km
        #[arg(short, long)]
        pace: String,

        /// Lactate in mmol/L
        #[arg(short, long)]
        lactate: String,

        /// Heart rate in bpm
        #[arg(long)]
        hr: Option<String>,

        /// Rating of perceived exertion (1-10)
        #[arg(long)]
        rpe: Option<String>,

        /// Speed in km/h
        #[arg(long)]
        speed: Option<String>,

        /// Cadence in steps per minute
        #[arg(long)]
        cadence: Option<String>,

        #[arg(long)]
        comments: Option<String>,

        /// Custom metrics as a JSON object
        #[arg(long, value_name = "JSON")]
        metrics: Option<String>,

        /// Custom metric as key=value, may be repeated
        #[arg(short = 'm', long = "metric", value_name = "KEY=VALUE")]
        metric: Vec<String>,
    },

    /// Import a pasted stage table (CSV, TSV or space aligned)
    Import {
        test_id: String,

        /// Input file (reads stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Import nothing when any row has errors
        #[arg(long)]
        strict: bool,
    },

    /// Estimate thresholds from a stage table without saving anything
    Estimate {
        /// Input file (reads stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a test as completed
    Complete { test_id: String },

    /// Replace the notes of a test
    Notes { test_id: String, text: String },

    /// Export a test as CSV (stage table) or JSON (full report)
    Export {
        test_id: String,

        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format (csv, json); guessed from the output extension
        #[arg(short = 'f', long)]
        format: Option<String>,
    },

    /// Manage configuration
    Config {
        /// List all settings
        #[arg(long)]
        list: bool,

        /// Print one setting, e.g. protocol.num_stages
        #[arg(long, value_name = "KEY")]
        get: Option<String>,

        /// Change one setting, e.g. import.strict=true
        #[arg(long, value_name = "KEY=VALUE")]
        set: Option<String>,
    },
}

/// Result of `estimate`, for JSON output
#[derive(Serialize)]
struct EstimateOutput<'a> {
    points: &'a [StagePoint],
    lt1: Option<&'a ThresholdEstimate>,
    lt2: Option<&'a ThresholdEstimate>,
    summary: &'a SessionSummary,
}

fn main() {
    if let Err(err) = run() {
        tracing::debug!(error = ?err, "Command failed");
        let message = match err.downcast_ref::<LactrsError>() {
            Some(lactrs_err) => lactrs_err.user_message(),
            None => format!("{:#}", err),
        };
        eprintln!("{} {}", "error:".red().bold(), message);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load_or_default(&config_path)?;

    let mut log_config = config.logging.clone();
    log_config.level = LogLevel::from_verbosity(log_config.level, cli.verbose);
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Config { list, get, set } => {
            handle_config(&mut config, &config_path, list, get, set)
        }
        Commands::Estimate { file, json } => handle_estimate(file.as_deref(), json),
        command => {
            let (identity, created) = Identity::resolve(&mut config.identity);
            if created {
                config.save_to_file(&config_path)?;
            }

            let db_path = config.settings.database_path();
            let mut store = SqliteStore::open(&db_path, identity.user_id.clone())
                .map_err(LactrsError::from)
                .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
            tracing::info!(user = %identity.user_id, guest = identity.is_guest, "Opened store");

            handle_store_command(&mut store, &config, command)
        }
    }
}

fn handle_store_command<S: PointStore>(
    store: &mut S,
    config: &AppConfig,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::New {
            title,
            notes,
            stages,
            stage_seconds,
        } => {
            let mut protocol = config.protocol.clone();
            if let Some(stages) = stages {
                protocol.num_stages = stages;
            }
            if let Some(seconds) = stage_seconds {
                protocol.stage_seconds = seconds;
            }

            let test = store
                .create_test(NewTest {
                    title,
                    notes,
                    protocol: Some(protocol),
                })
                .map_err(LactrsError::from)?;
            println!("{} {}", "✓ Created test".green(), test.id.bold());
            print!("{}", display::render_test_header(&test));
        }

        Commands::List => {
            let tests = store.list_tests().map_err(LactrsError::from)?;
            println!("{}", display::render_tests(&tests));
        }

        Commands::Show { test_id, json } => {
            let report = load_report(store, &test_id)?;
            if json {
                export::json::write_report(&report, io::stdout().lock()).map_err(LactrsError::from)?;
            } else {
                print!("{}", display::render_test_header(&report.test));
                println!("{}\n", display::render_points(&report.points));
                println!("{}", display::render_summary(&report.summary));
            }
        }

        Commands::Add {
            test_id,
            stage,
            pace,
            lactate,
            hr,
            rpe,
            speed,
            cadence,
            comments,
            metrics,
            metric,
        } => {
            let test = store.get_test(&test_id).map_err(LactrsError::from)?;
            let mut points = store.points_for_test(&test_id).map_err(LactrsError::from)?;

            let entry = StageEntry {
                stage_index: stage.unwrap_or_else(|| i64::from(next_stage_index(&points))),
                pace,
                lactate,
                hr: hr.unwrap_or_default(),
                rpe: rpe.unwrap_or_default(),
                comments: comments.unwrap_or_default(),
                speed: speed.unwrap_or_default(),
                cadence: cadence.unwrap_or_default(),
                metrics: metrics.unwrap_or_default(),
            };
            let mut input = StageEntryValidator::validate(&entry).map_err(LactrsError::from)?;
            input
                .metrics
                .extend(parse_metric_pairs(&metric).map_err(LactrsError::from)?);

            let saved = store.upsert_point(&test_id, input).map_err(LactrsError::from)?;
            println!(
                "{} stage {} of {}",
                "✓ Saved".green(),
                saved.stage_index,
                test.title
            );
            merge_saved_point(&mut points, saved);

            let summary = SummaryBuilder::new(&points)
                .with_protocol(&test.protocol)
                .build_with_estimates();
            println!("{}", display::render_points(&points));
            println!("{}", display::render_summary(&summary));
        }

        Commands::Import {
            test_id,
            file,
            strict,
        } => {
            let test = store.get_test(&test_id).map_err(LactrsError::from)?;
            let outcome = read_stage_table(file.as_deref())?;
            let report = outcome.report();

            if outcome.is_fatal() {
                bail!(outcome.error_messages().join(" "));
            }
            if (strict || config.import.strict) && outcome.has_errors() {
                for error in &report.errors {
                    eprintln!("  {} {}", "!".yellow(), error);
                }
                bail!("Nothing imported: fix the rows above or import without --strict");
            }

            let existing = store.points_for_test(&test_id).map_err(LactrsError::from)?;
            let saved = store
                .import_points(&test_id, outcome.rows)
                .map_err(LactrsError::from)?;
            tracing::info!(test = %test_id, saved = saved.len(), "Imported stage table");

            let points = reconcile_points(&existing, &saved);
            println!("{}", display::render_import_report(&report));
            println!("{}", display::render_points(&points));

            let summary = SummaryBuilder::new(&points)
                .with_protocol(&test.protocol)
                .build_with_estimates();
            println!("{}", display::render_summary(&summary));
        }

        Commands::Complete { test_id } => {
            let test = store.complete_test(&test_id).map_err(LactrsError::from)?;
            println!("{} {}", "✓ Completed".green(), test.title);
        }

        Commands::Notes { test_id, text } => {
            store
                .update_notes(&test_id, &text)
                .map_err(LactrsError::from)?;
            println!("{}", "✓ Notes updated".green());
        }

        Commands::Export {
            test_id,
            output,
            format,
        } => {
            let format = match (&format, &output) {
                (Some(name), _) => name.parse::<ExportFormat>().map_err(LactrsError::from)?,
                (None, Some(path)) => ExportFormat::from_path(path).unwrap_or(ExportFormat::Csv),
                (None, None) => ExportFormat::Csv,
            };
            let report = load_report(store, &test_id)?;
            export_report(&report, format, output.as_deref())?;
        }

        Commands::Config { .. } | Commands::Estimate { .. } => {
            bail!("this command does not use the test store")
        }
    }

    Ok(())
}

fn load_report<S: PointStore>(store: &S, test_id: &str) -> Result<TestReport> {
    let test = store.get_test(test_id).map_err(LactrsError::from)?;
    let points = store.points_for_test(test_id).map_err(LactrsError::from)?;
    Ok(TestReport::new(test, points))
}

fn export_report(report: &TestReport, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    match (format, output) {
        (ExportFormat::Csv, Some(path)) => {
            export::csv::export_points(&report.points, path).map_err(LactrsError::from)?
        }
        (ExportFormat::Csv, None) => {
            export::csv::write_points(&report.points, io::stdout().lock())
                .map_err(LactrsError::from)?
        }
        (ExportFormat::Json, Some(path)) => {
            export::json::export_json(report, path).map_err(LactrsError::from)?
        }
        (ExportFormat::Json, None) => {
            export::json::write_report(report, io::stdout().lock()).map_err(LactrsError::from)?
        }
    }

    if let Some(path) = output {
        eprintln!("{} {}", "✓ Exported to".green(), path.display());
    }
    Ok(())
}

fn read_stage_table(file: Option<&Path>) -> Result<ImportOutcome> {
    match file {
        Some(path) => {
            if !lactrs::import::can_import(path) {
                tracing::warn!(file = %path.display(), "Unexpected file extension, reading as text");
            }
            import_file(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => import_reader(io::stdin().lock()).context("Failed to read stdin"),
    }
}

fn handle_estimate(file: Option<&Path>, json: bool) -> Result<()> {
    let outcome = read_stage_table(file)?;
    if outcome.is_fatal() {
        bail!(outcome.error_messages().join(" "));
    }
    for error in outcome.error_messages() {
        eprintln!("  {} {}", "!".yellow(), error);
    }

    let now = Utc::now();
    let incoming: Vec<StagePoint> = outcome.rows.into_iter().map(|row| row.into_point(now)).collect();
    // Duplicate stage rows: the later row wins, as it would in the store
    let points = reconcile_points(&[], &incoming);

    let thresholds = ThresholdEstimator::estimate(&points);
    let summary = SummaryBuilder::new(&points).build(thresholds.lt1.as_ref(), thresholds.lt2.as_ref());

    if json {
        let output = EstimateOutput {
            points: &points,
            lt1: thresholds.lt1.as_ref(),
            lt2: thresholds.lt2.as_ref(),
            summary: &summary,
        };
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &output)?;
        writeln!(stdout)?;
    } else {
        println!("{}", display::render_points(&points));
        println!("{}", display::render_summary(&summary));
    }
    Ok(())
}

fn handle_config(
    config: &mut AppConfig,
    config_path: &Path,
    list: bool,
    get: Option<String>,
    set: Option<String>,
) -> Result<()> {
    if let Some(assignment) = set {
        let (key, value) = assignment
            .split_once('=')
            .context("Use --set key=value")?;
        config.set(key.trim(), value)?;
        config.save_to_file(config_path)?;
        println!("{} {}", "✓ Updated".green(), key.trim());
    }

    if let Some(key) = get {
        match config.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("{}", "(not set)".dimmed()),
        }
    }

    if list {
        println!("{} {}", "Config file:".bold(), config_path.display());
        for (key, value) in config.list()? {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    Ok(())
}
