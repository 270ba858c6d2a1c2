//! Reference data: syllabuses and historical grade boundaries.
//!
//! [`ReferenceDataProvider`] is the read-only contract the engine consumes.
//! [`ReferenceData`] is an in-memory implementation, usually built from the
//! CSV dataset in [`csv`].

pub mod csv;
mod memory;

pub use memory::ReferenceData;

use crate::error::ProviderError;
use crate::estimation::types::{BoundaryRecord, Season, Syllabus};

/// Read-only source of syllabuses and boundary history.
///
/// Both lookups fail with [`ProviderError::NotFound`] for an unknown subject.
/// A known subject with no history for a season yields an empty list.
pub trait ReferenceDataProvider: Send + Sync {
    fn syllabus(&self, subject_id: &str) -> Result<Syllabus, ProviderError>;

    /// Boundary records for the subject and season, in no particular order.
    fn boundaries(
        &self,
        subject_id: &str,
        season: Season,
    ) -> Result<Vec<BoundaryRecord>, ProviderError>;
}

impl<P: ReferenceDataProvider + ?Sized> ReferenceDataProvider for std::sync::Arc<P> {
    fn syllabus(&self, subject_id: &str) -> Result<Syllabus, ProviderError> {
        (**self).syllabus(subject_id)
    }

    fn boundaries(
        &self,
        subject_id: &str,
        season: Season,
    ) -> Result<Vec<BoundaryRecord>, ProviderError> {
        (**self).boundaries(subject_id, season)
    }
}
