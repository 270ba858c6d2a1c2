//! Error taxonomy for the estimation engine.
//!
//! Every failure is an explicit value. Callers match on [`EngineError::kind`]
//! for a machine-readable classification and use `Display` for the message.

use serde::Serialize;
use std::fmt;

use crate::estimation::types::{Grade, Season};

/// Machine-readable classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientData,
    DataIntegrity,
    Provider,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::DataIntegrity => "data_integrity",
            ErrorKind::Provider => "provider",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("request contains no entries")]
    EmptyBatch,

    #[error("request contains {count} entries, at most {max} are allowed")]
    TooManyEntries { count: usize, max: usize },

    #[error("{}", describe_issues(.0))]
    InvalidEntries(Vec<EntryIssue>),
}

fn describe_issues(issues: &[EntryIssue]) -> String {
    let noun = if issues.len() == 1 { "entry" } else { "entries" };
    let details = issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} invalid {}: {}", issues.len(), noun, details)
}

/// A single problem found in one entry of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryIssue {
    /// Position of the offending entry in the request.
    pub index: usize,
    pub subject_id: String,
    pub problem: EntryProblem,
}

impl fmt::Display for EntryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry {} ({}): {}",
            self.index, self.subject_id, self.problem
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryProblem {
    #[error("unknown subject")]
    UnknownSubject,

    #[error("no mark supplied for component {component}")]
    MissingComponent { component: String },

    #[error("component {component} is not part of this subject")]
    UnknownComponent { component: String },

    #[error("mark {mark} for component {component} is outside 0..={max_mark}")]
    MarkOutOfRange {
        component: String,
        mark: f64,
        max_mark: f64,
    },
}

/// No historical boundary data exists for a subject in a season.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no grade boundary data for {subject_id} in season {season}")]
pub struct InsufficientDataError {
    pub subject_id: String,
    pub season: Season,
}

/// The reference dataset itself is corrupt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("{subject_id} {year}: threshold {threshold} for grade {grade} is outside 0..=1")]
    ThresholdOutOfRange {
        subject_id: String,
        year: u16,
        grade: Grade,
        threshold: f64,
    },

    #[error(
        "{subject_id} {year}: threshold for {lower} ({lower_threshold}) exceeds {higher} \
         ({higher_threshold})"
    )]
    NonMonotonic {
        subject_id: String,
        year: u16,
        higher: Grade,
        higher_threshold: f64,
        lower: Grade,
        lower_threshold: f64,
    },

    #[error("{subject_id} {year}: grade U cannot carry a threshold")]
    UngradedThreshold { subject_id: String, year: u16 },

    #[error("{subject_id}: boundary year {year} appears more than once")]
    DuplicateYear { subject_id: String, year: u16 },

    #[error("{subject_id}: component weights sum to {sum}, expected 1.0")]
    InvalidWeights { subject_id: String, sum: f64 },

    #[error("{subject_id}: component {component} is invalid: {reason}")]
    InvalidComponent {
        subject_id: String,
        component: String,
        reason: String,
    },

    #[error("{subject_id}: component {component} is defined more than once")]
    DuplicateComponent {
        subject_id: String,
        component: String,
    },

    #[error("{subject_id}: syllabus defines no components")]
    EmptySyllabus { subject_id: String },

    #[error("{subject_id}: subject is defined more than once")]
    DuplicateSubject { subject_id: String },
}

/// Failure reported by a reference data provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("subject not found: {subject_id}")]
    NotFound { subject_id: String },

    #[error("reference data unavailable: {0}")]
    Unavailable(String),
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_entries must be at least 1")]
    ZeroMaxEntries,

    #[error("max_years must be between 1 and {max}, got {value}")]
    MaxYearsOutOfRange { value: usize, max: usize },

    #[error("invalid recency decay: {0}")]
    InvalidDecay(String),
}

/// Top-level error returned by the estimator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("insufficient data: {0}")]
    InsufficientData(#[from] InsufficientDataError),

    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::InsufficientData(_) => ErrorKind::InsufficientData,
            EngineError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            EngineError::Provider(_) => ErrorKind::Provider,
        }
    }
}

/// Serializable error body for callers that report failures as JSON.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<EntryIssue>,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        let issues = match err {
            EngineError::Validation(ValidationError::InvalidEntries(issues)) => issues.clone(),
            _ => Vec::new(),
        };
        ErrorBody {
            kind: err.kind(),
            message: err.to_string(),
            issues,
        }
    }
}
