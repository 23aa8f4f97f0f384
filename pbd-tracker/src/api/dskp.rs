//! DSKP item endpoints: curriculum CRUD and document import

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
        Multipart, Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use pbd_common::db::DskpItem;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::form::UploadForm;
use super::{require_parser, require_text, Created};
use crate::db::{dskp, subjects};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDskpRequest {
    #[serde(default)]
    pub sk: String,
    #[serde(default)]
    pub sp: String,
}

#[derive(Debug, Serialize)]
pub struct DskpImportResponse {
    pub count: usize,
    pub items: Vec<DskpItem>,
}

/// GET /api/subjects/:id/dskp
pub async fn list_items(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Vec<DskpItem>>> {
    let Path(subject_id) = path?;
    Ok(Json(dskp::list_items(&state.db, subject_id).await?))
}

/// POST /api/subjects/:id/dskp
pub async fn create_item(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CreateDskpRequest>, JsonRejection>,
) -> ApiResult<Json<Created>> {
    let Path(subject_id) = path?;
    let Json(request) = payload?;
    let sk = require_text("sk", &request.sk)?;
    let sp = require_text("sp", &request.sp)?;

    let id = dskp::insert_item(&state.db, subject_id, sk, sp).await?;
    info!(subject_id, dskp_item_id = id, "Created DSKP item");

    Ok(Json(Created { id }))
}

/// POST /api/subjects/:id/dskp/import
///
/// Multipart field `file`: a DSKP document (usually PDF).
pub async fn import_items(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DskpImportResponse>> {
    let Path(subject_id) = path?;
    let parser = require_parser(&state)?;
    let form = UploadForm::read(multipart?).await?;
    let file = form
        .file("file")
        .ok_or_else(|| ApiError::BadRequest("Missing file field 'file'".to_string()))?;

    if !subjects::subject_exists(&state.db, subject_id).await? {
        return Err(ApiError::Unprocessable(format!("Subject {} does not exist", subject_id)));
    }

    let extracted = parser
        .extract_dskp_items(&file.data, &file.mime_type())
        .await?;
    if extracted.is_empty() {
        warn!(subject_id, file = %file.file_name, "No SK/SP pairs found in DSKP document");
    }

    let pairs: Vec<(String, String)> = extracted.into_iter().map(|s| (s.sk, s.sp)).collect();
    let items = dskp::insert_items(&state.db, subject_id, &pairs).await?;
    info!(subject_id, count = items.len(), "Imported DSKP items");

    Ok(Json(DskpImportResponse {
        count: items.len(),
        items,
    }))
}

pub fn dskp_routes() -> Router<AppState> {
    Router::new()
        .route("/api/subjects/:id/dskp", get(list_items).post(create_item))
        .route("/api/subjects/:id/dskp/import", post(import_items))
}
