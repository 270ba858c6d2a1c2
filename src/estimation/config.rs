use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on the number of entries accepted per request.
pub const DEFAULT_MAX_ENTRIES: usize = 20;

/// Number of prior years consulted when resolving boundaries.
pub const MAX_HISTORY_YEARS: usize = 5;

/// Origin of the default linear decay: the most recent year weighs `6 - 1 = 5`,
/// the fifth most recent `6 - 5 = 1`.
pub const DEFAULT_LINEAR_ORIGIN: f64 = 6.0;

/// How much a historical year contributes to an averaged threshold.
///
/// `years_ago` counts from 1 for the anchor year (the newest usable year, or
/// the configured reference year) and grows by one per calendar year back, so
/// gaps in the history lower the weight of older years.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecencyDecay {
    /// `weight = max(origin - years_ago, 1)`.
    Linear { origin: f64 },
    /// `weight = factor ^ (years_ago - 1)`, with `factor` in `(0, 1]`.
    Exponential { factor: f64 },
    /// Every year counts equally.
    Uniform,
}

impl Default for RecencyDecay {
    fn default() -> Self {
        RecencyDecay::Linear {
            origin: DEFAULT_LINEAR_ORIGIN,
        }
    }
}

impl RecencyDecay {
    pub fn weight(&self, years_ago: u32) -> f64 {
        let years_ago = years_ago.max(1) as f64;
        match *self {
            RecencyDecay::Linear { origin } => (origin - years_ago).max(1.0),
            RecencyDecay::Exponential { factor } => factor.powf(years_ago - 1.0),
            RecencyDecay::Uniform => 1.0,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            RecencyDecay::Linear { origin } if !origin.is_finite() => Err(
                ConfigError::InvalidDecay(format!("linear origin {origin} is not finite")),
            ),
            RecencyDecay::Exponential { factor } if !(factor > 0.0 && factor <= 1.0) => Err(
                ConfigError::InvalidDecay(format!("exponential factor {factor} is outside (0, 1]")),
            ),
            _ => Ok(()),
        }
    }
}

/// What to do when a subject has no boundary history for the season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientDataPolicy {
    /// Report grade U with zero years used and keep going.
    #[default]
    Degrade,
    /// Fail the whole request.
    Fail,
}

/// Explicit engine configuration, passed in at construction.
///
/// Example JSON:
/// ```json
/// {
///   "max_entries": 20,
///   "max_years": 5,
///   "recency": { "kind": "exponential", "factor": 0.7 },
///   "reference_year": 2024,
///   "insufficient_data": "degrade",
///   "parallel": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_entries: usize,
    pub max_years: usize,
    pub recency: RecencyDecay,
    /// Anchor year for recency weighting. Records after it are ignored.
    pub reference_year: Option<u16>,
    pub insufficient_data: InsufficientDataPolicy,
    /// Evaluate entries on the rayon pool. Output order is unaffected.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_years: MAX_HISTORY_YEARS,
            recency: RecencyDecay::default(),
            reference_year: None,
            insufficient_data: InsufficientDataPolicy::default(),
            parallel: false,
        }
    }
}

impl EngineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config '{path}'"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::ZeroMaxEntries);
        }
        if !(1..=MAX_HISTORY_YEARS).contains(&self.max_years) {
            return Err(ConfigError::MaxYearsOutOfRange {
                value: self.max_years,
                max: MAX_HISTORY_YEARS,
            });
        }
        self.recency.validate()
    }
}
