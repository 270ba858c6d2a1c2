use std::collections::{BTreeSet, HashMap};

use super::ReferenceDataProvider;
use crate::error::{DataIntegrityError, ProviderError};
use crate::estimation::types::{BoundaryRecord, Season, Syllabus};

/// Immutable in-memory reference dataset.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    syllabuses: HashMap<String, Syllabus>,
    boundaries: HashMap<(String, Season), Vec<BoundaryRecord>>,
}

impl ReferenceData {
    /// Builds the dataset, rejecting invalid or duplicated syllabuses.
    ///
    /// Boundary records are stored as given; they are validated when resolved.
    pub fn new(
        syllabuses: Vec<Syllabus>,
        boundaries: Vec<(String, Season, BoundaryRecord)>,
    ) -> Result<Self, DataIntegrityError> {
        let mut by_subject = HashMap::with_capacity(syllabuses.len());
        for syllabus in syllabuses {
            syllabus.validate()?;
            if by_subject.contains_key(&syllabus.subject_id) {
                return Err(DataIntegrityError::DuplicateSubject {
                    subject_id: syllabus.subject_id,
                });
            }
            by_subject.insert(syllabus.subject_id.clone(), syllabus);
        }

        let mut grouped: HashMap<(String, Season), Vec<BoundaryRecord>> = HashMap::new();
        for (subject_id, season, record) in boundaries {
            grouped.entry((subject_id, season)).or_default().push(record);
        }

        Ok(Self {
            syllabuses: by_subject,
            boundaries: grouped,
        })
    }

    /// All syllabuses, ordered by subject id.
    pub fn syllabuses(&self) -> Vec<&Syllabus> {
        let mut all: Vec<&Syllabus> = self.syllabuses.values().collect();
        all.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        all
    }

    /// Every `(subject, season)` pair that has at least one boundary record,
    /// ordered by subject then season.
    pub fn boundary_keys(&self) -> Vec<(String, Season)> {
        self.boundaries
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl ReferenceDataProvider for ReferenceData {
    fn syllabus(&self, subject_id: &str) -> Result<Syllabus, ProviderError> {
        self.syllabuses
            .get(subject_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                subject_id: subject_id.to_string(),
            })
    }

    fn boundaries(
        &self,
        subject_id: &str,
        season: Season,
    ) -> Result<Vec<BoundaryRecord>, ProviderError> {
        if !self.syllabuses.contains_key(subject_id) {
            return Err(ProviderError::NotFound {
                subject_id: subject_id.to_string(),
            });
        }
        Ok(self
            .boundaries
            .get(&(subject_id.to_string(), season))
            .cloned()
            .unwrap_or_default())
    }
}
