//! Subject endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::get,
    Json, Router,
};
use pbd_common::db::Subject;
use serde::Deserialize;
use tracing::info;

use super::{require_text, Created};
use crate::db::subjects;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSubjectRequest {
    #[serde(default)]
    pub name: String,
}

/// GET /api/classes/:id/subjects
pub async fn list_subjects(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Vec<Subject>>> {
    let Path(class_id) = path?;
    Ok(Json(subjects::list_subjects(&state.db, class_id).await?))
}

/// POST /api/classes/:id/subjects
pub async fn create_subject(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CreateSubjectRequest>, JsonRejection>,
) -> ApiResult<Json<Created>> {
    let Path(class_id) = path?;
    let Json(request) = payload?;
    let name = require_text("name", &request.name)?;

    let id = subjects::insert_subject(&state.db, class_id, name).await?;
    info!(class_id, subject_id = id, "Created subject {}", name);

    Ok(Json(Created { id }))
}

pub fn subject_routes() -> Router<AppState> {
    Router::new().route(
        "/api/classes/:id/subjects",
        get(list_subjects).post(create_subject),
    )
}
