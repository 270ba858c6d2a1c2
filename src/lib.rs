//! Grade estimation from component marks and historical grade boundaries.
//!
//! The library is a pure engine: give it a [`reference::ReferenceDataProvider`]
//! and an [`estimation::EngineConfig`], then call
//! [`estimation::GradeEstimator::estimate`]. The `grade_estimator` binary is a
//! thin CLI around it.

pub mod error;
pub mod estimation;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod reference;
