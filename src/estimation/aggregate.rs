use std::collections::BTreeMap;

use crate::error::EntryProblem;
use crate::estimation::types::Syllabus;
use crate::estimation::utility::clamp_unit;

/// Converts raw component marks into a single normalized weighted mark.
///
/// Every component defined by the syllabus must be present, no unknown
/// component may be supplied, and each mark must lie in `0..=max_mark`. All
/// problems are returned at once, in syllabus order followed by unknown codes.
///
/// The result is `sum(mark / max_mark * weight)`, clamped to `[0, 1]` so a
/// malformed weight table cannot push it out of range.
pub fn normalize(
    syllabus: &Syllabus,
    marks: &BTreeMap<String, f64>,
) -> Result<f64, Vec<EntryProblem>> {
    let mut problems = Vec::new();
    let mut total = 0.0;

    for component in &syllabus.components {
        let Some(&mark) = marks.get(&component.code) else {
            problems.push(EntryProblem::MissingComponent {
                component: component.code.clone(),
            });
            continue;
        };

        if !(mark.is_finite() && mark >= 0.0 && mark <= component.max_mark) {
            problems.push(EntryProblem::MarkOutOfRange {
                component: component.code.clone(),
                mark,
                max_mark: component.max_mark,
            });
            continue;
        }

        total += mark / component.max_mark * component.weight;
    }

    for code in marks.keys() {
        if syllabus.component(code).is_none() {
            problems.push(EntryProblem::UnknownComponent {
                component: code.clone(),
            });
        }
    }

    if problems.is_empty() {
        Ok(clamp_unit(total))
    } else {
        Err(problems)
    }
}
