use rayon::prelude::*;
use tracing::debug;

use crate::error::{
    ConfigError, EngineError, EntryIssue, EntryProblem, ProviderError, ValidationError,
};
use crate::estimation::aggregate::normalize;
use crate::estimation::config::{EngineConfig, InsufficientDataPolicy};
use crate::estimation::grade::classify;
use crate::estimation::resolve::resolve;
use crate::estimation::types::{
    CalculationEntry, EffectiveBoundaryTable, EstimateRequest, EstimateResult, Grade, Season,
};
use crate::reference::ReferenceDataProvider;

/// Public entry point of the engine.
///
/// Holds only the read-only provider and the configuration, so one instance
/// can serve concurrent callers.
pub struct GradeEstimator<P> {
    provider: P,
    config: EngineConfig,
}

impl<P: ReferenceDataProvider> GradeEstimator<P> {
    pub fn new(provider: P, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Effective boundary table for a subject and season under this config.
    pub fn boundaries(
        &self,
        subject_id: &str,
        season: Season,
    ) -> Result<EffectiveBoundaryTable, EngineError> {
        resolve(&self.provider, subject_id, season, &self.config)
    }

    /// Estimates a grade for every entry, returning results in input order.
    ///
    /// Malformed entries (unknown subject, missing/unknown component, mark out
    /// of range) fail the whole call with one error listing every offending
    /// entry. A subject with no boundary history for `season` is reported as
    /// U with zero years used unless the config says to fail instead.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(entries = entries.len(), season = %season)
    )]
    pub fn estimate(
        &self,
        entries: &[CalculationEntry],
        season: Season,
    ) -> Result<Vec<EstimateResult>, EngineError> {
        if entries.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if entries.len() > self.config.max_entries {
            return Err(ValidationError::TooManyEntries {
                count: entries.len(),
                max: self.config.max_entries,
            }
            .into());
        }

        let marks = self.normalize_all(entries)?;

        let outcomes: Vec<Result<EstimateResult, EngineError>> = if self.config.parallel {
            entries
                .par_iter()
                .zip(marks.par_iter())
                .map(|(entry, mark)| self.estimate_one(entry, *mark, season))
                .collect()
        } else {
            entries
                .iter()
                .zip(&marks)
                .map(|(entry, mark)| self.estimate_one(entry, *mark, season))
                .collect()
        };

        // The first failure in input order wins, whichever thread produced it.
        outcomes.into_iter().collect()
    }

    /// Convenience wrapper over [`GradeEstimator::estimate`] for a decoded payload.
    pub fn estimate_request(
        &self,
        request: &EstimateRequest,
    ) -> Result<Vec<EstimateResult>, EngineError> {
        self.estimate(&request.entries, request.season)
    }

    /// Validates every entry and computes its normalized mark.
    fn normalize_all(&self, entries: &[CalculationEntry]) -> Result<Vec<f64>, EngineError> {
        let mut issues = Vec::new();
        let mut marks = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let syllabus = match self.provider.syllabus(&entry.subject_id) {
                Ok(syllabus) => syllabus,
                Err(ProviderError::NotFound { .. }) => {
                    issues.push(EntryIssue {
                        index,
                        subject_id: entry.subject_id.clone(),
                        problem: EntryProblem::UnknownSubject,
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match normalize(&syllabus, &entry.marks) {
                Ok(mark) => marks.push(mark),
                Err(problems) => issues.extend(problems.into_iter().map(|problem| EntryIssue {
                    index,
                    subject_id: entry.subject_id.clone(),
                    problem,
                })),
            }
        }

        if issues.is_empty() {
            Ok(marks)
        } else {
            Err(ValidationError::InvalidEntries(issues).into())
        }
    }

    fn estimate_one(
        &self,
        entry: &CalculationEntry,
        normalized_mark: f64,
        season: Season,
    ) -> Result<EstimateResult, EngineError> {
        match self.boundaries(&entry.subject_id, season) {
            Ok(table) => Ok(EstimateResult {
                subject_id: entry.subject_id.clone(),
                normalized_mark,
                estimated_grade: classify(normalized_mark, &table),
                years_used: table.years_used(),
                adjusted: table.adjusted,
            }),
            Err(EngineError::InsufficientData(e))
                if self.config.insufficient_data == InsufficientDataPolicy::Degrade =>
            {
                debug!(
                    subject_id = %e.subject_id,
                    season = %e.season,
                    "No boundary history, degrading to U"
                );
                Ok(EstimateResult {
                    subject_id: entry.subject_id.clone(),
                    normalized_mark,
                    estimated_grade: Grade::U,
                    years_used: 0,
                    adjusted: false,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataIntegrityError, ErrorKind, InsufficientDataError};
    use crate::estimation::types::{BoundaryRecord, ComponentDef, Syllabus};
    use crate::reference::ReferenceData;

    fn physics() -> Syllabus {
        Syllabus {
            subject_id: "0625".to_string(),
            name: "Physics".to_string(),
            components: vec![
                ComponentDef {
                    code: "P1".to_string(),
                    max_mark: 40.0,
                    weight: 0.4,
                },
                ComponentDef {
                    code: "P2".to_string(),
                    max_mark: 60.0,
                    weight: 0.6,
                },
            ],
        }
    }

    fn chemistry() -> Syllabus {
        Syllabus {
            subject_id: "0620".to_string(),
            name: "Chemistry".to_string(),
            components: vec![ComponentDef {
                code: "P4".to_string(),
                max_mark: 80.0,
                weight: 1.0,
            }],
        }
    }

    fn record(year: u16, thresholds: &[(Grade, f64)]) -> BoundaryRecord {
        BoundaryRecord {
            year,
            thresholds: thresholds.iter().copied().collect(),
        }
    }

    fn dataset() -> ReferenceData {
        let table = [(Grade::AStar, 0.90), (Grade::A, 0.80), (Grade::B, 0.70)];
        ReferenceData::new(
            vec![physics(), chemistry()],
            vec![
                ("0625".to_string(), Season::MayJune, record(2023, &table)),
                ("0625".to_string(), Season::MayJune, record(2022, &table)),
                ("0620".to_string(), Season::MayJune, record(2023, &table)),
                ("0620".to_string(), Season::OctoberNovember, record(2023, &table)),
            ],
        )
        .unwrap()
    }

    fn estimator(config: EngineConfig) -> GradeEstimator<ReferenceData> {
        GradeEstimator::new(dataset(), config).unwrap()
    }

    fn physics_entry(p1: f64, p2: f64) -> CalculationEntry {
        CalculationEntry::new("0625", &[("P1", p1), ("P2", p2)])
    }

    #[test]
    fn test_single_entry_estimate() {
        let results = estimator(EngineConfig::default())
            .estimate(&[physics_entry(32.0, 54.0)], Season::MayJune)
            .unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.subject_id, "0625");
        assert!((r.normalized_mark - 0.86).abs() < 1e-12);
        assert_eq!(r.estimated_grade, Grade::A);
        assert_eq!(r.years_used, 2);
        assert!(!r.adjusted);
    }

    #[test]
    fn test_mark_on_boundary_earns_grade() {
        // 64/80 = 0.80, exactly the A threshold.
        let results = estimator(EngineConfig::default())
            .estimate(&[CalculationEntry::new("0620", &[("P4", 64.0)])], Season::MayJune)
            .unwrap();
        assert_eq!(results[0].normalized_mark, 0.8);
        assert_eq!(results[0].estimated_grade, Grade::A);
    }

    #[test]
    fn test_missing_season_degrades_to_u() {
        let results = estimator(EngineConfig::default())
            .estimate(&[physics_entry(40.0, 60.0)], Season::OctoberNovember)
            .unwrap();
        assert_eq!(results[0].estimated_grade, Grade::U);
        assert_eq!(results[0].years_used, 0);
        assert!((results[0].normalized_mark - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degradation_is_per_entry_within_a_batch() {
        // Chemistry has October/November history, physics does not.
        let entries = vec![
            CalculationEntry::new("0620", &[("P4", 76.0)]),
            physics_entry(40.0, 60.0),
            CalculationEntry::new("0620", &[("P4", 64.0)]),
        ];
        for parallel in [false, true] {
            let results = estimator(EngineConfig {
                parallel,
                ..EngineConfig::default()
            })
            .estimate(&entries, Season::OctoberNovember)
            .unwrap();

            let subjects: Vec<&str> = results.iter().map(|r| r.subject_id.as_str()).collect();
            assert_eq!(subjects, vec!["0620", "0625", "0620"]);
            assert_eq!(results[0].estimated_grade, Grade::AStar);
            assert_eq!(results[0].years_used, 1);
            assert_eq!(results[1].estimated_grade, Grade::U);
            assert_eq!(results[1].years_used, 0);
            assert!((results[1].normalized_mark - 1.0).abs() < 1e-12);
            assert_eq!(results[2].estimated_grade, Grade::A);
            assert_eq!(results[2].years_used, 1);
        }
    }

    /// Knows physics but cannot reach the syllabus or boundary store.
    struct Outage {
        syllabus_down: bool,
    }

    impl ReferenceDataProvider for Outage {
        fn syllabus(&self, _subject_id: &str) -> Result<Syllabus, ProviderError> {
            if self.syllabus_down {
                Err(ProviderError::Unavailable("syllabus store offline".to_string()))
            } else {
                Ok(physics())
            }
        }

        fn boundaries(
            &self,
            _subject_id: &str,
            _season: Season,
        ) -> Result<Vec<BoundaryRecord>, ProviderError> {
            Err(ProviderError::Unavailable("boundary store offline".to_string()))
        }
    }

    #[test]
    fn test_unavailable_syllabus_store_fails_the_call() {
        let est = GradeEstimator::new(Outage { syllabus_down: true }, EngineConfig::default())
            .unwrap();
        let err = est
            .estimate(&[physics_entry(32.0, 54.0)], Season::MayJune)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(matches!(err, EngineError::Provider(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_unavailable_boundary_store_is_not_degraded() {
        for parallel in [false, true] {
            let config = EngineConfig {
                parallel,
                ..EngineConfig::default()
            };
            let est = GradeEstimator::new(Outage { syllabus_down: false }, config).unwrap();
            let err = est
                .estimate(&[physics_entry(32.0, 54.0)], Season::MayJune)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Provider);
            assert_eq!(
                err,
                EngineError::Provider(ProviderError::Unavailable(
                    "boundary store offline".to_string()
                ))
            );
        }
    }

    #[test]
    fn test_fail_policy_surfaces_insufficient_data() {
        let config = EngineConfig {
            insufficient_data: InsufficientDataPolicy::Fail,
            ..EngineConfig::default()
        };
        let err = estimator(config)
            .estimate(&[physics_entry(40.0, 60.0)], Season::OctoberNovember)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientData(InsufficientDataError {
                subject_id: "0625".to_string(),
                season: Season::OctoberNovember,
            })
        );
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = estimator(EngineConfig::default())
            .estimate(&[], Season::MayJune)
            .unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::EmptyBatch));
    }

    #[test]
    fn test_entry_limit_both_sides() {
        let est = estimator(EngineConfig::default());
        let twenty = vec![physics_entry(20.0, 30.0); 20];
        assert_eq!(est.estimate(&twenty, Season::MayJune).unwrap().len(), 20);

        let twenty_one = vec![physics_entry(20.0, 30.0); 21];
        assert_eq!(
            est.estimate(&twenty_one, Season::MayJune).unwrap_err(),
            EngineError::Validation(ValidationError::TooManyEntries { count: 21, max: 20 })
        );
    }

    #[test]
    fn test_configured_entry_limit() {
        let est = estimator(EngineConfig {
            max_entries: 2,
            ..EngineConfig::default()
        });
        assert_eq!(est.config().max_entries, 2);
        let three = vec![physics_entry(20.0, 30.0); 3];
        assert!(matches!(
            est.estimate(&three, Season::MayJune),
            Err(EngineError::Validation(ValidationError::TooManyEntries { count: 3, max: 2 }))
        ));
    }

    #[test]
    fn test_all_offending_entries_reported() {
        let entries = vec![
            physics_entry(32.0, 54.0),
            CalculationEntry::new("9999", &[("P1", 1.0)]),
            CalculationEntry::new("0625", &[("P1", 32.0)]),
            CalculationEntry::new("0620", &[("P4", 81.0)]),
        ];
        let err = estimator(EngineConfig::default())
            .estimate(&entries, Season::MayJune)
            .unwrap_err();

        let EngineError::Validation(ValidationError::InvalidEntries(issues)) = err else {
            panic!("expected InvalidEntries");
        };
        let indices: Vec<usize> = issues.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(issues[0].problem, EntryProblem::UnknownSubject);
        assert_eq!(
            issues[1].problem,
            EntryProblem::MissingComponent {
                component: "P2".to_string()
            }
        );
        assert!(matches!(issues[2].problem, EntryProblem::MarkOutOfRange { .. }));
    }

    #[test]
    fn test_order_preserved() {
        let entries = vec![
            CalculationEntry::new("0620", &[("P4", 40.0)]),
            physics_entry(40.0, 60.0),
            CalculationEntry::new("0620", &[("P4", 76.0)]),
        ];
        let results = estimator(EngineConfig::default())
            .estimate(&entries, Season::MayJune)
            .unwrap();
        let subjects: Vec<&str> = results.iter().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(subjects, vec!["0620", "0625", "0620"]);
        assert_eq!(results[0].estimated_grade, Grade::U);
        assert_eq!(results[1].estimated_grade, Grade::AStar);
        assert_eq!(results[2].estimated_grade, Grade::AStar);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let entries: Vec<_> = (0..20)
            .map(|i| physics_entry((i * 2) as f64, (i * 3) as f64))
            .collect();
        let sequential = estimator(EngineConfig::default())
            .estimate(&entries, Season::MayJune)
            .unwrap();
        let parallel = estimator(EngineConfig {
            parallel: true,
            ..EngineConfig::default()
        })
        .estimate(&entries, Season::MayJune)
        .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_corrupt_boundaries_are_fatal() {
        let data = ReferenceData::new(
            vec![physics()],
            vec![(
                "0625".to_string(),
                Season::MayJune,
                record(2023, &[(Grade::A, 0.6), (Grade::B, 0.7)]),
            )],
        )
        .unwrap();
        let err = GradeEstimator::new(data, EngineConfig::default())
            .unwrap()
            .estimate(&[physics_entry(32.0, 54.0)], Season::MayJune)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::DataIntegrity(DataIntegrityError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let result = GradeEstimator::new(
            dataset(),
            EngineConfig {
                max_entries: 0,
                ..EngineConfig::default()
            },
        );
        assert!(matches!(result, Err(ConfigError::ZeroMaxEntries)));
    }

    #[test]
    fn test_estimate_request_wrapper() {
        let request = EstimateRequest {
            entries: vec![physics_entry(32.0, 54.0)],
            season: Season::MayJune,
        };
        let results = estimator(EngineConfig::default())
            .estimate_request(&request)
            .unwrap();
        assert_eq!(results[0].estimated_grade, Grade::A);
    }
}
