//! Grade estimation engine.
//!
//! Raw component marks are normalized into a single weighted mark
//! ([`aggregate`]), historical boundaries for the subject and season are
//! combined into one recency-weighted table ([`resolve`]), and the mark is
//! classified against that table ([`grade`]). [`estimator`] drives the three
//! steps over a batch of entries.

pub mod aggregate;
pub mod config;
pub mod estimator;
pub mod grade;
pub mod resolve;
pub mod types;
pub mod utility;

pub use config::{EngineConfig, InsufficientDataPolicy, RecencyDecay};
pub use estimator::GradeEstimator;
pub use types::{
    BoundaryRecord, CalculationEntry, ComponentDef, EffectiveBoundaryTable, EstimateRequest,
    EstimateResult, Grade, Season, Syllabus,
};
