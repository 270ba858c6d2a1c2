//! CSV reference dataset loader.
//!
//! Two files make up a dataset:
//!
//! `syllabuses.csv`, one row per component in declared order:
//! ```text
//! subject_id,subject_name,component,max_mark,weight
//! 0625,Physics,P2,40,0.3
//! ```
//!
//! `boundaries.csv`, one row per subject, season and year, thresholds as
//! normalized fractions (an empty cell means no threshold that year):
//! ```text
//! subject_id,season,year,a_star,a,b,c,d,e,f,g
//! 0625,MJ,2023,0.86,0.74,0.62,0.50,0.40,0.30,0.20,0.10
//! ```
//!
//! Either file may be gzip-compressed.

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;

use super::ReferenceData;
use crate::estimation::types::{BoundaryRecord, ComponentDef, Grade, Season, Syllabus};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Deserialize)]
struct SyllabusRow {
    subject_id: String,
    subject_name: String,
    component: String,
    max_mark: f64,
    weight: f64,
}

#[derive(Debug, Deserialize)]
struct BoundaryRow {
    subject_id: String,
    season: Season,
    year: u16,
    a_star: Option<f64>,
    a: Option<f64>,
    b: Option<f64>,
    c: Option<f64>,
    d: Option<f64>,
    e: Option<f64>,
    f: Option<f64>,
    g: Option<f64>,
}

impl BoundaryRow {
    fn into_record(self) -> (String, Season, BoundaryRecord) {
        let cells = [
            (Grade::AStar, self.a_star),
            (Grade::A, self.a),
            (Grade::B, self.b),
            (Grade::C, self.c),
            (Grade::D, self.d),
            (Grade::E, self.e),
            (Grade::F, self.f),
            (Grade::G, self.g),
        ];
        let thresholds: BTreeMap<Grade, f64> = cells
            .into_iter()
            .filter_map(|(grade, t)| t.map(|t| (grade, t)))
            .collect();
        (
            self.subject_id,
            self.season,
            BoundaryRecord {
                year: self.year,
                thresholds,
            },
        )
    }
}

/// Returns the bytes unchanged, or gunzipped if they carry the gzip magic.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .context("failed to decompress gzip data")?;
    Ok(out)
}

fn reader(bytes: &[u8]) -> ::csv::Reader<&[u8]> {
    ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_reader(bytes)
}

/// Parses syllabus rows, grouping components by subject in first-seen order.
pub fn parse_syllabuses(bytes: &[u8]) -> Result<Vec<Syllabus>> {
    let bytes = decompress(bytes)?;
    let mut rdr = reader(&bytes);
    let mut syllabuses: Vec<Syllabus> = Vec::new();

    for (i, result) in rdr.deserialize().enumerate() {
        let row: SyllabusRow =
            result.with_context(|| format!("syllabuses.csv: invalid row {}", i + 1))?;

        let component = ComponentDef {
            code: row.component,
            max_mark: row.max_mark,
            weight: row.weight,
        };

        match syllabuses.iter_mut().find(|s| s.subject_id == row.subject_id) {
            Some(existing) => {
                if existing.name != row.subject_name {
                    bail!(
                        "syllabuses.csv: row {} names subject {} '{}', earlier rows say '{}'",
                        i + 1,
                        row.subject_id,
                        row.subject_name,
                        existing.name
                    );
                }
                existing.components.push(component);
            }
            None => syllabuses.push(Syllabus {
                subject_id: row.subject_id,
                name: row.subject_name,
                components: vec![component],
            }),
        }
    }

    debug!(subjects = syllabuses.len(), "Parsed syllabuses");
    Ok(syllabuses)
}

/// Parses boundary rows into `(subject, season, record)` triples.
pub fn parse_boundaries(bytes: &[u8]) -> Result<Vec<(String, Season, BoundaryRecord)>> {
    let bytes = decompress(bytes)?;
    let mut rdr = reader(&bytes);
    let mut records = Vec::new();

    for (i, result) in rdr.deserialize().enumerate() {
        let row: BoundaryRow =
            result.with_context(|| format!("boundaries.csv: invalid row {}", i + 1))?;
        records.push(row.into_record());
    }

    debug!(records = records.len(), "Parsed boundary records");
    Ok(records)
}

/// Builds a validated [`ReferenceData`] from the two CSV files.
pub fn load_reference(syllabus_bytes: &[u8], boundary_bytes: &[u8]) -> Result<ReferenceData> {
    let syllabuses = parse_syllabuses(syllabus_bytes)?;
    let boundaries = parse_boundaries(boundary_bytes)?;
    let data = ReferenceData::new(syllabuses, boundaries)
        .context("reference dataset failed validation")?;
    Ok(data)
}
