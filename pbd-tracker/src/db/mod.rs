//! Database access layer for pbd-tracker
//!
//! Query functions take the pool (or a transaction) explicitly; the schema
//! and connection setup live in `pbd_common::db`.

pub mod assessments;
pub mod classes;
pub mod dskp;
pub mod filter;
pub mod stats;
pub mod students;
pub mod subjects;

pub use filter::{AssessmentFilter, AssessmentParams, Predicate};
