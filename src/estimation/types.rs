//! Data model shared by the estimation pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::DataIntegrityError;

/// Tolerance applied when checking that component weights sum to 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// One of the three annual exam sittings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    #[serde(rename = "FM")]
    FebruaryMarch,
    #[serde(rename = "MJ")]
    MayJune,
    #[serde(rename = "ON")]
    OctoberNovember,
}

impl Season {
    pub const ALL: [Season; 3] = [
        Season::FebruaryMarch,
        Season::MayJune,
        Season::OctoberNovember,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Season::FebruaryMarch => "FM",
            Season::MayJune => "MJ",
            Season::OctoberNovember => "ON",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FM" => Ok(Season::FebruaryMarch),
            "MJ" => Ok(Season::MayJune),
            "ON" => Ok(Season::OctoberNovember),
            other => Err(format!("unknown season '{other}', expected FM, MJ or ON")),
        }
    }
}

/// Letter grade, declared from highest to lowest so that `Ord` follows rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A*")]
    AStar,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    U,
}

impl Grade {
    /// Grades that carry a minimum threshold, highest first. U is the fallback.
    pub const THRESHOLD_GRADES: [Grade; 8] = [
        Grade::AStar,
        Grade::A,
        Grade::B,
        Grade::C,
        Grade::D,
        Grade::E,
        Grade::F,
        Grade::G,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Grade::AStar => "A*",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
            Grade::G => "G",
            Grade::U => "U",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::THRESHOLD_GRADES
            .iter()
            .chain(std::iter::once(&Grade::U))
            .find(|g| g.label().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown grade '{s}'"))
    }
}

/// A scored part of a subject's assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub code: String,
    pub max_mark: f64,
    /// Fraction of the final mark contributed by this component.
    pub weight: f64,
}

/// A subject and its ordered component definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Syllabus {
    pub subject_id: String,
    pub name: String,
    pub components: Vec<ComponentDef>,
}

impl Syllabus {
    pub fn component(&self, code: &str) -> Option<&ComponentDef> {
        self.components.iter().find(|c| c.code == code)
    }

    /// Checks the invariants a syllabus must satisfy before it can be used.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        if self.components.is_empty() {
            return Err(DataIntegrityError::EmptySyllabus {
                subject_id: self.subject_id.clone(),
            });
        }

        let mut seen = HashSet::new();
        for c in &self.components {
            if !seen.insert(c.code.as_str()) {
                return Err(DataIntegrityError::DuplicateComponent {
                    subject_id: self.subject_id.clone(),
                    component: c.code.clone(),
                });
            }
            let reason = if !(c.max_mark.is_finite() && c.max_mark > 0.0) {
                Some(format!("max mark {} must be positive", c.max_mark))
            } else if !(c.weight.is_finite() && c.weight >= 0.0) {
                Some(format!("weight {} must be non-negative", c.weight))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(DataIntegrityError::InvalidComponent {
                    subject_id: self.subject_id.clone(),
                    component: c.code.clone(),
                    reason,
                });
            }
        }

        let sum: f64 = self.components.iter().map(|c| c.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(DataIntegrityError::InvalidWeights {
                subject_id: self.subject_id.clone(),
                sum,
            });
        }

        Ok(())
    }
}

/// Grade thresholds for one subject, season and year.
///
/// Thresholds are normalized marks in `[0, 1]`. A grade absent from the map
/// had no threshold that year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRecord {
    pub year: u16,
    pub thresholds: BTreeMap<Grade, f64>,
}

impl BoundaryRecord {
    /// Rejects thresholds that are out of range, attached to U, or increasing
    /// as grade rank decreases.
    pub fn validate(&self, subject_id: &str) -> Result<(), DataIntegrityError> {
        if self.thresholds.contains_key(&Grade::U) {
            return Err(DataIntegrityError::UngradedThreshold {
                subject_id: subject_id.to_string(),
                year: self.year,
            });
        }

        let mut previous: Option<(Grade, f64)> = None;
        // BTreeMap iterates from A* downward.
        for (&grade, &threshold) in &self.thresholds {
            if !(threshold.is_finite() && (0.0..=1.0).contains(&threshold)) {
                return Err(DataIntegrityError::ThresholdOutOfRange {
                    subject_id: subject_id.to_string(),
                    year: self.year,
                    grade,
                    threshold,
                });
            }
            if let Some((higher, higher_threshold)) = previous {
                if threshold > higher_threshold {
                    return Err(DataIntegrityError::NonMonotonic {
                        subject_id: subject_id.to_string(),
                        year: self.year,
                        higher,
                        higher_threshold,
                        lower: grade,
                        lower_threshold: threshold,
                    });
                }
            }
            previous = Some((grade, threshold));
        }

        Ok(())
    }
}

/// Boundaries combined across several years, used for classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveBoundaryTable {
    pub thresholds: BTreeMap<Grade, f64>,
    /// Years that contributed, most recent first.
    pub years: Vec<u16>,
    /// Set when monotonicity had to be restored after averaging.
    pub adjusted: bool,
}

impl EffectiveBoundaryTable {
    pub fn years_used(&self) -> usize {
        self.years.len()
    }

    pub fn threshold(&self, grade: Grade) -> Option<f64> {
        self.thresholds.get(&grade).copied()
    }
}

/// Raw marks for one subject, as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationEntry {
    pub subject_id: String,
    pub marks: BTreeMap<String, f64>,
}

impl CalculationEntry {
    pub fn new(subject_id: impl Into<String>, marks: &[(&str, f64)]) -> Self {
        Self {
            subject_id: subject_id.into(),
            marks: marks.iter().map(|(c, m)| (c.to_string(), *m)).collect(),
        }
    }
}

/// Inbound request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub entries: Vec<CalculationEntry>,
    pub season: Season,
}

/// The estimate for one entry, in the same position as the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult {
    pub subject_id: String,
    pub normalized_mark: f64,
    pub estimated_grade: Grade,
    /// Number of historical years backing the estimate, 0 when degraded.
    pub years_used: usize,
    pub adjusted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syllabus(components: &[(&str, f64, f64)]) -> Syllabus {
        Syllabus {
            subject_id: "0625".to_string(),
            name: "Physics".to_string(),
            components: components
                .iter()
                .map(|(code, max_mark, weight)| ComponentDef {
                    code: code.to_string(),
                    max_mark: *max_mark,
                    weight: *weight,
                })
                .collect(),
        }
    }

    fn record(year: u16, thresholds: &[(Grade, f64)]) -> BoundaryRecord {
        BoundaryRecord {
            year,
            thresholds: thresholds.iter().copied().collect(),
        }
    }

    #[test]
    fn test_grade_order_follows_rank() {
        assert!(Grade::AStar < Grade::A);
        assert!(Grade::G < Grade::U);
        let mut grades = vec![Grade::C, Grade::U, Grade::AStar, Grade::A];
        grades.sort();
        assert_eq!(grades, vec![Grade::AStar, Grade::A, Grade::C, Grade::U]);
    }

    #[test]
    fn test_grade_parse_and_display() {
        assert_eq!("A*".parse::<Grade>().unwrap(), Grade::AStar);
        assert_eq!("u".parse::<Grade>().unwrap(), Grade::U);
        assert!("H".parse::<Grade>().is_err());
        assert_eq!(Grade::AStar.to_string(), "A*");
    }

    #[test]
    fn test_season_codes() {
        assert_eq!("mj".parse::<Season>().unwrap(), Season::MayJune);
        assert_eq!(" ON ".parse::<Season>().unwrap(), Season::OctoberNovember);
        assert!("JJ".parse::<Season>().is_err());
        for season in Season::ALL {
            assert_eq!(season.code().parse::<Season>().unwrap(), season);
        }
        let json = serde_json::to_string(&Season::FebruaryMarch).unwrap();
        assert_eq!(json, "\"FM\"");
    }

    #[test]
    fn test_thresholds_serialize_with_grade_labels() {
        let r = record(2023, &[(Grade::AStar, 0.9), (Grade::A, 0.8)]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["thresholds"]["A*"], 0.9);
        assert_eq!(json["thresholds"]["A"], 0.8);
    }

    #[test]
    fn test_valid_syllabus() {
        let s = syllabus(&[("P1", 40.0, 0.4), ("P2", 60.0, 0.6)]);
        assert!(s.validate().is_ok());
        assert_eq!(s.component("P2").unwrap().max_mark, 60.0);
        assert!(s.component("P3").is_none());
    }

    #[test]
    fn test_syllabus_weights_within_tolerance() {
        let third = 1.0 / 3.0;
        let s = syllabus(&[("P1", 10.0, third), ("P2", 10.0, third), ("P3", 10.0, third)]);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_syllabus_rejects_bad_weights() {
        let s = syllabus(&[("P1", 40.0, 0.4), ("P2", 60.0, 0.5)]);
        assert!(matches!(
            s.validate(),
            Err(DataIntegrityError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn test_syllabus_rejects_duplicate_and_empty() {
        let s = syllabus(&[("P1", 40.0, 0.5), ("P1", 60.0, 0.5)]);
        assert!(matches!(
            s.validate(),
            Err(DataIntegrityError::DuplicateComponent { .. })
        ));
        let s = syllabus(&[]);
        assert!(matches!(
            s.validate(),
            Err(DataIntegrityError::EmptySyllabus { .. })
        ));
    }

    #[test]
    fn test_syllabus_rejects_zero_max_mark() {
        let s = syllabus(&[("P1", 0.0, 1.0)]);
        assert!(matches!(
            s.validate(),
            Err(DataIntegrityError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn test_record_validation() {
        let ok = record(2023, &[(Grade::AStar, 0.9), (Grade::A, 0.8), (Grade::C, 0.8)]);
        assert!(ok.validate("0625").is_ok());

        let inverted = record(2023, &[(Grade::A, 0.7), (Grade::B, 0.75)]);
        assert!(matches!(
            inverted.validate("0625"),
            Err(DataIntegrityError::NonMonotonic {
                higher: Grade::A,
                lower: Grade::B,
                ..
            })
        ));

        let negative = record(2023, &[(Grade::G, -0.1)]);
        assert!(matches!(
            negative.validate("0625"),
            Err(DataIntegrityError::ThresholdOutOfRange { .. })
        ));

        let with_u = record(2023, &[(Grade::U, 0.0)]);
        assert!(matches!(
            with_u.validate("0625"),
            Err(DataIntegrityError::UngradedThreshold { .. })
        ));
    }
}
