//! # PBD Common Library
//!
//! Shared code for the PBD assessment tracker:
//! - Database initialization and schema
//! - Domain models (classes, students, subjects, DSKP items, assessments)
//! - Configuration loading and root folder resolution
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
