//! Dashboard statistics endpoint

use axum::{extract::State, routing::get, Json, Router};
use pbd_common::db::Stats;

use crate::db::stats;
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<Stats>> {
    Ok(Json(stats::fetch_stats(&state.db).await?))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}
