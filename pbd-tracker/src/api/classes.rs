//! Class endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use pbd_common::db::Class;
use serde::Deserialize;
use tracing::info;

use super::{require_text, Created};
use crate::db::classes;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateClassRequest {
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub teacher_name: String,
}

/// GET /api/classes
pub async fn list_classes(State(state): State<AppState>) -> ApiResult<Json<Vec<Class>>> {
    Ok(Json(classes::list_classes(&state.db).await?))
}

/// POST /api/classes
pub async fn create_class(
    State(state): State<AppState>,
    payload: Result<Json<CreateClassRequest>, JsonRejection>,
) -> ApiResult<Json<Created>> {
    let Json(request) = payload?;
    let year = require_text("year", &request.year)?;
    let name = require_text("name", &request.name)?;

    let id = classes::insert_class(&state.db, year, name, request.teacher_name.trim()).await?;
    info!(class_id = id, "Created class {} {}", year, name);

    Ok(Json(Created { id }))
}

pub fn class_routes() -> Router<AppState> {
    Router::new().route("/api/classes", get(list_classes).post(create_class))
}
