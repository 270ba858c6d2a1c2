//! CLI entry point for the grade estimator.
//!
//! Provides subcommands for estimating grades from a request file, inspecting
//! the effective boundary table of a subject, and checking a reference
//! dataset for integrity problems.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use grade_estimator::error::ErrorBody;
use grade_estimator::estimation::{EngineConfig, GradeEstimator, Season};
use grade_estimator::fetch::{BasicClient, auth::ApiKey, fetch_bytes};
use grade_estimator::output::{append_records, print_json, print_pretty};
use grade_estimator::parser::parse_request;
use grade_estimator::reference::{ReferenceData, csv::load_reference};
use std::ffi::OsStr;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "grade_estimator")]
#[command(
    about = "Estimate grades from component marks and historical boundaries",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    data: DataArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Syllabus CSV, path or URL (may be gzip-compressed)
    #[arg(long, global = true, default_value = "data/syllabuses.csv")]
    syllabuses: String,

    /// Grade boundary CSV, path or URL (may be gzip-compressed)
    #[arg(long, global = true, default_value = "data/boundaries.csv")]
    boundaries: String,

    /// Engine configuration JSON file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Anchor year for recency weighting (overrides the config file)
    #[arg(long, global = true)]
    reference_year: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate grades for the entries in a JSON request
    Estimate {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        request: String,

        /// Season to estimate for, overriding the request (FM, MJ or ON)
        #[arg(short, long, value_parser = parse_season)]
        season: Option<Season>,

        /// Maximum entries per request (overrides the config file)
        #[arg(long)]
        max_entries: Option<usize>,

        /// Evaluate entries in parallel
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Optional: CSV file to append results to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show the effective boundary table for a subject and season
    Boundaries {
        /// Subject id (syllabus code)
        #[arg(long)]
        subject: String,

        /// Season (FM, MJ or ON)
        #[arg(long, value_parser = parse_season)]
        season: Season,
    },
    /// Resolve every subject and season in the dataset and report problems
    CheckData,
}

fn parse_season(s: &str) -> Result<Season, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/grade_estimator.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("grade_estimator.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.data.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if cli.data.reference_year.is_some() {
        config.reference_year = cli.data.reference_year;
    }

    match cli.command {
        Commands::Estimate {
            request,
            season,
            max_entries,
            parallel,
            output,
        } => {
            if let Some(max_entries) = max_entries {
                config.max_entries = max_entries;
            }
            config.parallel |= parallel;

            let estimator = load_estimator(&cli.data, config).await?;
            let request = parse_request(&fetcher(&request).await?)?;
            let season = season.unwrap_or(request.season);

            info!(entries = request.entries.len(), %season, "Estimating grades");
            match estimator.estimate(&request.entries, season) {
                Ok(results) => {
                    print_pretty(&results);
                    print_json(&results)?;

                    let degraded = results.iter().filter(|r| r.years_used == 0).count();
                    if degraded > 0 {
                        warn!(degraded, "Some subjects have no boundary history for this season");
                    }

                    if let Some(path) = output {
                        append_records(&path, Utc::now(), season, &results)?;
                        info!(path, "Results appended");
                    }
                }
                Err(err) => {
                    error!(kind = %err.kind(), error = %err, "Estimate failed");
                    println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&err))?);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Boundaries { subject, season } => {
            let estimator = load_estimator(&cli.data, config).await?;
            match estimator.boundaries(&subject, season) {
                Ok(table) => {
                    let body = serde_json::json!({
                        "subject_id": subject,
                        "season": season,
                        "years_used": table.years_used(),
                        "table": table,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(err) => {
                    error!(kind = %err.kind(), error = %err, "Boundary resolution failed");
                    println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&err))?);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::CheckData => {
            let estimator = load_estimator(&cli.data, config).await?;
            if !check_data(&estimator) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Loads data from a local file path or fetches it over HTTP.
///
/// Remote requests carry a bearer token when `REFERENCE_DATA_TOKEN` is set.
#[tracing::instrument(skip(source), fields(source = %source))]
async fn fetcher(source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        match std::env::var("REFERENCE_DATA_TOKEN") {
            Ok(token) => {
                let client = ApiKey::bearer(BasicClient::new(), &token)?;
                fetch_bytes(&client, source).await?
            }
            Err(_) => fetch_bytes(&BasicClient::new(), source).await?,
        }
    } else {
        std::fs::read(source).with_context(|| format!("failed to read '{source}'"))?
    };
    Ok(bytes)
}

/// Loads the reference dataset and builds an estimator over it.
#[tracing::instrument(
    skip_all,
    fields(syllabuses = %data.syllabuses, boundaries = %data.boundaries)
)]
async fn load_estimator(
    data: &DataArgs,
    config: EngineConfig,
) -> Result<GradeEstimator<ReferenceData>> {
    let (syllabus_bytes, boundary_bytes) =
        tokio::try_join!(fetcher(&data.syllabuses), fetcher(&data.boundaries))?;
    let reference = load_reference(&syllabus_bytes, &boundary_bytes)?;
    info!(
        subjects = reference.syllabuses().len(),
        series = reference.boundary_keys().len(),
        "Reference data loaded"
    );
    let estimator = GradeEstimator::new(reference, config)?;
    let config = estimator.config();
    info!(
        max_entries = config.max_entries,
        max_years = config.max_years,
        recency = ?config.recency,
        reference_year = ?config.reference_year,
        parallel = config.parallel,
        "Engine configured"
    );
    Ok(estimator)
}

/// Resolves every boundary series in the dataset. Returns `false` if any
/// series is corrupt or belongs to an unknown subject.
fn check_data(estimator: &GradeEstimator<ReferenceData>) -> bool {
    let reference = estimator.provider();
    let mut failures = 0;
    let mut adjusted = 0;

    let keys = reference.boundary_keys();

    for syllabus in reference.syllabuses() {
        let missing: Vec<Season> = Season::ALL
            .into_iter()
            .filter(|season| !keys.iter().any(|(id, s)| id == &syllabus.subject_id && s == season))
            .collect();
        if missing.len() == Season::ALL.len() {
            warn!(subject_id = %syllabus.subject_id, "Subject has no boundary history");
        } else if !missing.is_empty() {
            info!(subject_id = %syllabus.subject_id, ?missing, "Seasons without history");
        }
    }

    for (subject_id, season) in keys {
        match estimator.boundaries(&subject_id, season) {
            Ok(table) => {
                if table.adjusted {
                    adjusted += 1;
                    warn!(
                        %subject_id,
                        %season,
                        years = ?table.years,
                        "Averaged table needed monotonic repair"
                    );
                } else {
                    info!(
                        %subject_id,
                        %season,
                        years_used = table.years_used(),
                        "Boundary series ok"
                    );
                }
            }
            Err(err) => {
                failures += 1;
                error!(
                    %subject_id,
                    %season,
                    kind = %err.kind(),
                    error = %err,
                    "Boundary series invalid"
                );
            }
        }
    }

    info!(failures, adjusted, "Reference data check complete");
    failures == 0
}
