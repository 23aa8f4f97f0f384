//! pbd-tracker library - classroom assessment (PBD) tracking service
//!
//! Records per-student mastery levels (TP1-TP6) against DSKP curriculum
//! items, stores photo evidence, and serves filtered reports as JSON or CSV.

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, FixedOffset, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod blob;
pub mod db;
pub mod docparse;
pub mod error;
pub mod export;

pub use blob::EvidenceStore;
pub use docparse::DocumentParser;
pub use error::{ApiError, ApiResult};

/// Default request body limit (multipart uploads included)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Default body limit for bulk entry
pub const DEFAULT_MAX_BULK_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Uploaded photos and evidence
    pub blobs: EvidenceStore,
    /// Document parser; `None` disables the import endpoints
    pub parser: Option<Arc<DocumentParser>>,
    /// Offset used for report timestamps and file names
    pub report_offset: FixedOffset,
    /// Request body limit in bytes
    pub max_upload_bytes: usize,
    /// Request body limit for `POST /api/assessments/bulk`
    pub max_bulk_upload_bytes: usize,
    /// Pre-built UI bundle served for unmatched paths
    pub static_assets: Option<PathBuf>,
    /// Server startup time (for uptime calculation)
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state with defaults for the optional parts
    pub fn new(db: SqlitePool, blobs: EvidenceStore) -> Self {
        Self {
            db,
            blobs,
            parser: None,
            report_offset: pbd_common::time::report_offset(0),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_bulk_upload_bytes: DEFAULT_MAX_BULK_UPLOAD_BYTES,
            static_assets: None,
            startup_time: Utc::now(),
        }
    }

    pub fn with_parser(mut self, parser: DocumentParser) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn with_report_offset(mut self, offset: FixedOffset) -> Self {
        self.report_offset = offset;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_max_bulk_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_bulk_upload_bytes = bytes;
        self
    }

    pub fn with_static_assets(mut self, dir: Option<PathBuf>) -> Self {
        self.static_assets = dir;
        self
    }
}

/// Build application router
///
/// `/api/*` and `/health` are JSON endpoints, `/uploads/*` serves stored
/// files, and when a UI bundle is configured every other path falls back to
/// it (unknown paths get `index.html`).
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.blobs.dir());
    let max_upload_bytes = state.max_upload_bytes;
    let max_bulk_upload_bytes = state.max_bulk_upload_bytes;
    let static_assets = state.static_assets.clone();

    let mut router = Router::new()
        .merge(api::class_routes())
        .merge(api::student_routes())
        .merge(api::subject_routes())
        .merge(api::dskp_routes())
        .merge(api::assessment_routes())
        .merge(api::bulk_routes().layer(DefaultBodyLimit::max(max_bulk_upload_bytes)))
        .merge(api::stats_routes())
        .merge(api::health_routes())
        .nest_service("/uploads", uploads)
        .with_state(state);

    if let Some(dir) = static_assets {
        let index = ServeFile::new(dir.join("index.html"));
        let spa = ServeDir::new(dir).not_found_service(index);
        router = router.fallback_service(spa);
    }

    // The bulk route's own limit is the inner layer and takes precedence
    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}
