//! Assessment endpoints
//!
//! - GET  /api/assessments             filtered, joined list
//! - GET  /api/assessments/export.csv  same filter, CSV download
//! - POST /api/assessments             one record, optional `evidence` file
//! - POST /api/assessments/bulk        many records in one transaction,
//!                                     optional `evidence_<student_id>` files

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pbd_common::db::{AssessmentRecord, NewAssessment, SkillSet, TpLevel};
use pbd_common::time;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::form::{UploadForm, UploadedFile};
use super::Created;
use crate::blob::StagedBlob;
use crate::db::{assessments, AssessmentFilter, AssessmentParams};
use crate::error::{ApiError, ApiResult};
use crate::export;
use crate::AppState;

/// Prefix of per-student evidence file fields in a bulk submission
pub const EVIDENCE_FIELD_PREFIX: &str = "evidence_";

/// One student's entry in a bulk submission
#[derive(Debug, Clone, Deserialize)]
pub struct BulkEntry {
    pub student_id: i64,
    /// Absent or 0 means "not assessed"
    #[serde(default)]
    pub tp_level: Option<i64>,
    #[serde(default)]
    pub skills: SkillSet,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub success: bool,
    pub count: usize,
    pub skipped: usize,
}

/// GET /api/assessments
pub async fn list_assessments(
    State(state): State<AppState>,
    query: Result<Query<AssessmentParams>, QueryRejection>,
) -> ApiResult<Json<Vec<AssessmentRecord>>> {
    let Query(params) = query?;
    let filter = AssessmentFilter::from_params(&params)?;
    Ok(Json(assessments::query(&state.db, &filter).await?))
}

/// GET /api/assessments/export.csv
pub async fn export_csv(
    State(state): State<AppState>,
    query: Result<Query<AssessmentParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = query?;
    let filter = AssessmentFilter::from_params(&params)?;
    let records = assessments::query(&state.db, &filter).await?;
    let body = export::render_csv(&records, &state.report_offset)?;
    let file_name = export::report_file_name(&time::now(), &state.report_offset);

    info!(rows = records.len(), file = %file_name, "Exported assessment report");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    ))
}

/// POST /api/assessments
pub async fn create_assessment(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Created>> {
    let form = UploadForm::read(multipart?).await?;

    let student_id = form.required_id("student_id")?;
    let subject_id = form.required_id("subject_id")?;
    let dskp_item_id = form.required_id("dskp_item_id")?;
    let tp_level = parse_tp_level(form.required_id("tp_level")?)?;
    let timestamp = parse_optional_timestamp(form.text("timestamp"))?;

    // Everything is validated; only now touch the blob store
    let staged = match form.file("evidence") {
        Some(file) => Some(state.blobs.stage(&file.file_name, &file.data).await?),
        None => None,
    };

    let new = NewAssessment {
        student_id,
        subject_id,
        dskp_item_id,
        tp_level,
        skills: SkillSet::parse(form.text_or_empty("skills")),
        note: form.text_or_empty("note").to_string(),
        evidence_url: staged.as_ref().map(|s| s.url().to_string()),
        timestamp,
    };

    let id = assessments::insert_one(&state.db, &new).await?;
    if let Some(staged) = staged {
        staged.commit();
    }

    info!(assessment_id = id, student_id, tp_level = %tp_level, "Recorded assessment");
    Ok(Json(Created { id }))
}

/// POST /api/assessments/bulk
///
/// Fields: `subject_id`, `dskp_item_id`, optional `timestamp`, and
/// `assessments`, a JSON array of [`BulkEntry`]. Every recorded row shares
/// subject, item and timestamp.
pub async fn create_bulk(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<BulkResponse>> {
    let form = UploadForm::read(multipart?).await?;

    let subject_id = form.required_id("subject_id")?;
    let dskp_item_id = form.required_id("dskp_item_id")?;
    let timestamp = parse_optional_timestamp(form.text("timestamp"))?;

    let entries: Vec<BulkEntry> = match form.text("assessments") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            ApiError::BadRequest(format!("Field 'assessments' is not a valid entry list: {}", e))
        })?,
        None => Vec::new(),
    };

    let mut recorded = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match entry.tp_level {
            None | Some(0) => skipped += 1,
            Some(level) => recorded.push((parse_tp_level(level)?, entry)),
        }
    }

    if recorded.is_empty() {
        return Err(ApiError::BadRequest("No assessments to record".to_string()));
    }

    let recorded_students: HashSet<i64> = recorded.iter().map(|(_, e)| e.student_id).collect();
    let evidence = match_evidence_files(&form, &recorded_students)?;

    // Files are durable before the transaction starts; on any error below
    // the guards drop and delete them
    let mut staged: HashMap<i64, StagedBlob> = HashMap::with_capacity(evidence.len());
    for (student_id, file) in evidence {
        let blob = state.blobs.stage(&file.file_name, &file.data).await?;
        staged.insert(student_id, blob);
    }

    let batch: Vec<NewAssessment> = recorded
        .into_iter()
        .map(|(tp_level, entry)| NewAssessment {
            student_id: entry.student_id,
            subject_id,
            dskp_item_id,
            tp_level,
            evidence_url: staged.get(&entry.student_id).map(|s| s.url().to_string()),
            skills: entry.skills,
            note: entry.note,
            timestamp,
        })
        .collect();

    let ids = assessments::insert_bulk(&state.db, &batch).await?;
    for blob in staged.into_values() {
        blob.commit();
    }

    info!(
        subject_id,
        dskp_item_id,
        count = ids.len(),
        skipped,
        "Recorded bulk assessments"
    );
    Ok(Json(BulkResponse {
        success: true,
        count: ids.len(),
        skipped,
    }))
}

/// Pair `evidence_<student_id>` file parts with recorded students
///
/// Files for students without a recorded entry (skipped or simply not
/// listed) are left out and never staged.
fn match_evidence_files<'a>(
    form: &'a UploadForm,
    recorded_students: &HashSet<i64>,
) -> ApiResult<HashMap<i64, &'a UploadedFile>> {
    let mut seen = HashSet::new();
    let mut matched = HashMap::new();

    for file in form.files() {
        let Some(suffix) = file.field.strip_prefix(EVIDENCE_FIELD_PREFIX) else {
            debug!(field = %file.field, "Ignoring unexpected file field");
            continue;
        };

        let student_id: i64 = suffix.parse().map_err(|_| {
            ApiError::BadRequest(format!(
                "Evidence field '{}' does not name a student id",
                file.field
            ))
        })?;

        if !seen.insert(student_id) {
            return Err(ApiError::BadRequest(format!(
                "More than one evidence file for student {}",
                student_id
            )));
        }

        if recorded_students.contains(&student_id) {
            matched.insert(student_id, file);
        } else {
            warn!(
                student_id,
                file = %file.file_name,
                "Ignoring evidence file for student without a recorded assessment"
            );
        }
    }

    Ok(matched)
}

fn parse_tp_level(raw: i64) -> ApiResult<TpLevel> {
    TpLevel::try_from(raw).map_err(ApiError::from)
}

fn parse_optional_timestamp(raw: Option<&str>) -> ApiResult<chrono::DateTime<chrono::Utc>> {
    match raw {
        Some(value) => time::parse_timestamp(value)
            .map_err(|_| ApiError::BadRequest(format!("Invalid timestamp: {}", value))),
        None => Ok(time::now()),
    }
}

pub fn assessment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/assessments",
            get(list_assessments).post(create_assessment),
        )
        .route("/api/assessments/export.csv", get(export_csv))
}

/// Bulk entry sits apart so it can carry its own body limit
pub fn bulk_routes() -> Router<AppState> {
    Router::new().route("/api/assessments/bulk", post(create_bulk))
}
