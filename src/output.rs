//! Output formatting and persistence for estimate results.
//!
//! Supports debug logging, JSON printing, and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::estimation::types::{EstimateResult, Grade, Season};

/// One CSV row: an estimate plus when and for which season it was made.
#[derive(Debug, Serialize)]
pub struct EstimateRecord<'a> {
    pub estimated_at: DateTime<Utc>,
    pub season: Season,
    pub subject_id: &'a str,
    pub normalized_mark: f64,
    pub estimated_grade: Grade,
    pub years_used: usize,
    pub adjusted: bool,
}

impl<'a> EstimateRecord<'a> {
    pub fn new(estimated_at: DateTime<Utc>, season: Season, result: &'a EstimateResult) -> Self {
        Self {
            estimated_at,
            season,
            subject_id: &result.subject_id,
            normalized_mark: result.normalized_mark,
            estimated_grade: result.estimated_grade,
            years_used: result.years_used,
            adjusted: result.adjusted,
        }
    }
}

/// Logs results using Rust's debug pretty-print format.
pub fn print_pretty(results: &[EstimateResult]) {
    debug!("{:#?}", results);
}

/// Logs results as pretty-printed JSON, in input order.
pub fn print_json(results: &[EstimateResult]) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}

/// Appends one CSV row per result.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records(
    path: &str,
    estimated_at: DateTime<Utc>,
    season: Season,
    results: &[EstimateResult],
) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = results.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for result in results {
        writer.serialize(EstimateRecord::new(estimated_at, season, result))?;
    }
    writer.flush()?;

    Ok(())
}
