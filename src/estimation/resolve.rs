//! Combines several years of grade boundaries into one effective table.
//!
//! Each grade's effective threshold is a recency-weighted mean over the years
//! that define it, weighted by
//! [`RecencyDecay`](crate::estimation::config::RecencyDecay). Years without a
//! threshold for a grade are left out of that grade's mean rather than counted
//! as zero.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

use crate::error::{DataIntegrityError, EngineError, InsufficientDataError};
use crate::estimation::config::EngineConfig;
use crate::estimation::types::{BoundaryRecord, EffectiveBoundaryTable, Grade, Season};
use crate::estimation::utility::weighted_mean;
use crate::reference::ReferenceDataProvider;

/// Fetches boundary history for `subject_id` in `season` and combines it.
///
/// # Errors
///
/// - [`EngineError::InsufficientData`] when no usable year exists
/// - [`EngineError::DataIntegrity`] when a record is corrupt
/// - [`EngineError::Provider`] when the lookup itself fails
pub fn resolve<P: ReferenceDataProvider + ?Sized>(
    provider: &P,
    subject_id: &str,
    season: Season,
    config: &EngineConfig,
) -> Result<EffectiveBoundaryTable, EngineError> {
    let records = provider.boundaries(subject_id, season)?;
    combine(subject_id, season, &records, config)
}

/// Combines already-fetched records. See [`resolve`].
pub fn combine(
    subject_id: &str,
    season: Season,
    records: &[BoundaryRecord],
    config: &EngineConfig,
) -> Result<EffectiveBoundaryTable, EngineError> {
    let mut seen = HashSet::new();
    for record in records {
        record.validate(subject_id)?;
        if !seen.insert(record.year) {
            return Err(DataIntegrityError::DuplicateYear {
                subject_id: subject_id.to_string(),
                year: record.year,
            }
            .into());
        }
    }

    // Newest first; empty records carry no boundary data and are skipped.
    let mut usable: Vec<&BoundaryRecord> = records
        .iter()
        .filter(|r| !r.thresholds.is_empty())
        .filter(|r| config.reference_year.is_none_or(|anchor| r.year <= anchor))
        .collect();
    usable.sort_by(|a, b| b.year.cmp(&a.year));
    usable.truncate(config.max_years);

    let Some(newest) = usable.first() else {
        return Err(insufficient(subject_id, season));
    };
    let anchor = config.reference_year.unwrap_or(newest.year);

    // Years whose weight underflows to zero contribute nothing and are dropped.
    let weighted: Vec<(&BoundaryRecord, f64)> = usable
        .iter()
        .map(|r| {
            let years_ago = u32::from(anchor - r.year) + 1;
            let weight = config.recency.weight(years_ago);
            trace!(subject_id, year = r.year, years_ago, weight, "Boundary year weight");
            (*r, weight)
        })
        .filter(|(_, weight)| *weight > 0.0)
        .collect();
    if weighted.is_empty() {
        return Err(insufficient(subject_id, season));
    }

    let mut thresholds = BTreeMap::new();
    for grade in Grade::THRESHOLD_GRADES {
        let pairs: Vec<(f64, f64)> = weighted
            .iter()
            .filter_map(|(r, w)| r.thresholds.get(&grade).map(|t| (*t, *w)))
            .collect();
        if let Some(mean) = weighted_mean(&pairs) {
            thresholds.insert(grade, mean);
        }
    }

    let adjusted = enforce_monotonic(&mut thresholds);
    if adjusted {
        debug!(subject_id, %season, "Averaged boundaries were not monotonic, clamped");
    }

    Ok(EffectiveBoundaryTable {
        thresholds,
        years: weighted.iter().map(|(r, _)| r.year).collect(),
        adjusted,
    })
}

fn insufficient(subject_id: &str, season: Season) -> EngineError {
    InsufficientDataError {
        subject_id: subject_id.to_string(),
        season,
    }
    .into()
}

/// Clamps each threshold to at most the one above it. Returns whether any
/// value changed.
pub fn enforce_monotonic(thresholds: &mut BTreeMap<Grade, f64>) -> bool {
    let mut adjusted = false;
    let mut ceiling = f64::INFINITY;
    for threshold in thresholds.values_mut() {
        if *threshold > ceiling {
            *threshold = ceiling;
            adjusted = true;
        }
        ceiling = *threshold;
    }
    adjusted
}
