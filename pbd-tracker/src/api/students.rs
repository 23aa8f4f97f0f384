//! Student endpoints: roster CRUD, photo upload and roster import

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
        Multipart, Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use pbd_common::db::Student;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::form::UploadForm;
use super::{require_parser, require_text, Created};
use crate::db::{classes, students};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub id: i64,
    pub photo_url: String,
}

#[derive(Debug, Serialize)]
pub struct StudentImportResponse {
    pub count: usize,
    pub students: Vec<Student>,
}

/// GET /api/classes/:id/students
pub async fn list_students(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Vec<Student>>> {
    let Path(class_id) = path?;
    Ok(Json(students::list_students(&state.db, class_id).await?))
}

/// POST /api/classes/:id/students
pub async fn create_student(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CreateStudentRequest>, JsonRejection>,
) -> ApiResult<Json<Created>> {
    let Path(class_id) = path?;
    let Json(request) = payload?;
    let name = require_text("name", &request.name)?;

    let id = students::insert_student(&state.db, class_id, name, &request.notes).await?;
    info!(class_id, student_id = id, "Created student");

    Ok(Json(Created { id }))
}

/// POST /api/students/:id/photo
///
/// Multipart field `photo`. Replaces any previous photo; the old file is
/// deleted once the row points at the new one.
pub async fn upload_photo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PhotoResponse>> {
    let Path(student_id) = path?;
    let form = UploadForm::read(multipart?).await?;
    let photo = form
        .file("photo")
        .ok_or_else(|| ApiError::BadRequest("Missing file field 'photo'".to_string()))?;

    let student = students::get_student(&state.db, student_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Student {} not found", student_id)))?;

    let staged = state.blobs.stage(&photo.file_name, &photo.data).await?;
    let photo_url = staged.url().to_string();

    // Dropping `staged` on error removes the new file
    let previous = students::set_photo(&state.db, student_id, &photo_url).await?;
    staged.commit();

    if let Some(previous) = previous.filter(|p| *p != photo_url) {
        state.blobs.delete_url(&previous).await;
    }

    info!(student_id, student = %student.name, url = %photo_url, "Updated student photo");
    Ok(Json(PhotoResponse {
        id: student_id,
        photo_url,
    }))
}

/// POST /api/classes/:id/students/import
///
/// Multipart field `file`: a roster document. Every extracted name becomes
/// a student of the class, all in one transaction.
pub async fn import_students(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<StudentImportResponse>> {
    let Path(class_id) = path?;
    let parser = require_parser(&state)?;
    let form = UploadForm::read(multipart?).await?;
    let file = form
        .file("file")
        .ok_or_else(|| ApiError::BadRequest("Missing file field 'file'".to_string()))?;

    if !classes::class_exists(&state.db, class_id).await? {
        return Err(ApiError::Unprocessable(format!("Class {} does not exist", class_id)));
    }

    let names = parser
        .extract_student_names(&file.data, &file.mime_type())
        .await?;
    if names.is_empty() {
        warn!(class_id, file = %file.file_name, "No student names found in roster");
    }

    let students = students::insert_students(&state.db, class_id, &names).await?;
    info!(
        class_id,
        count = students.len(),
        "Imported students from roster"
    );

    Ok(Json(StudentImportResponse {
        count: students.len(),
        students,
    }))
}

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/classes/:id/students",
            get(list_students).post(create_student),
        )
        .route("/api/classes/:id/students/import", post(import_students))
        .route("/api/students/:id/photo", post(upload_photo))
}
