//! HTTP API handlers for pbd-tracker

pub mod assessments;
pub mod classes;
pub mod dskp;
pub mod form;
pub mod health;
pub mod stats;
pub mod students;
pub mod subjects;

pub use assessments::{assessment_routes, bulk_routes};
pub use classes::class_routes;
pub use dskp::dskp_routes;
pub use health::health_routes;
pub use stats::stats_routes;
pub use students::student_routes;
pub use subjects::subject_routes;

use serde::Serialize;
use std::sync::Arc;

use crate::docparse::DocumentParser;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Response body of every create endpoint
#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i64,
}

/// Trimmed value of a required text field
fn require_text<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("Field '{}' is required", field)));
    }
    Ok(value)
}

fn require_parser(state: &AppState) -> ApiResult<Arc<DocumentParser>> {
    state.parser.clone().ok_or_else(|| {
        ApiError::Unavailable(format!(
            "Document parsing is not configured (set {})",
            pbd_common::config::PARSER_API_KEY_ENV
        ))
    })
}
