use crate::estimation::types::{EffectiveBoundaryTable, Grade};

/// Slack allowed when comparing a mark against a threshold. Averaged
/// thresholds carry rounding noise, e.g. five years of 0.80 average to
/// 0.8000000000000002.
pub const BOUNDARY_EPSILON: f64 = 1e-9;

/// Maps a normalized mark to a letter grade.
///
/// Scans from A* downward and returns the first grade whose threshold is at
/// or below `mark`; a mark exactly on a boundary earns that grade. Grades the
/// table has no threshold for are skipped. Falls back to U. Thresholds within
/// [`BOUNDARY_EPSILON`] above the mark count as met.
///
/// | Table           | Mark  | Grade |
/// |-----------------|-------|-------|
/// | A* 0.90, A 0.80 | 0.95  | A*    |
/// | A* 0.90, A 0.80 | 0.80  | A     |
/// | A* 0.90, A 0.80 | 0.79  | U     |
pub fn classify(mark: f64, table: &EffectiveBoundaryTable) -> Grade {
    Grade::THRESHOLD_GRADES
        .into_iter()
        .find(|grade| table.threshold(*grade).is_some_and(|t| t <= mark + BOUNDARY_EPSILON))
        .unwrap_or(Grade::U)
}
