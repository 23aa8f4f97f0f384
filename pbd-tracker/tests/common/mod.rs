//! Shared helpers for pbd-tracker integration tests
//!
//! Each test gets its own in-memory database and a temporary uploads
//! directory, driven through the real router with `oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use pbd_common::db::init::init_memory_database;
use pbd_tracker::docparse::{DocumentParser, ParserSettings};
use pbd_tracker::{build_router, AppState, EvidenceStore};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
    pub uploads: PathBuf,
    _dir: TempDir,
}

/// Test helper: app without a document parser
pub async fn setup_app() -> TestApp {
    setup_app_with(|state| state).await
}

/// Test helper: app whose document parser talks to `endpoint`
pub async fn setup_app_with_parser(endpoint: String) -> TestApp {
    let parser = DocumentParser::new(ParserSettings {
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
        endpoint,
        timeout: Duration::from_secs(5),
        max_retries: 0,
    })
    .expect("Should build parser");
    setup_app_with(move |state| state.with_parser(parser)).await
}

/// Test helper: app with adjusted state (limits, offsets, ...)
pub async fn setup_app_with(configure: impl FnOnce(AppState) -> AppState) -> TestApp {
    let dir = TempDir::new().expect("Should create temp dir");
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).expect("Should create uploads dir");

    let db = init_memory_database()
        .await
        .expect("Should open in-memory database");
    let state = configure(AppState::new(db.clone(), EvidenceStore::new(&uploads)));

    TestApp {
        router: build_router(state),
        db,
        uploads,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self.get(uri).await;
        let status = response.status();
        (status, extract_json(response.into_body()).await)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.send(request).await;
        let status = response.status();
        (status, extract_json(response.into_body()).await)
    }

    pub async fn post_form(&self, uri: &str, form: MultipartBuilder) -> (StatusCode, Value) {
        let response = self.send(form.into_request(uri)).await;
        let status = response.status();
        (status, extract_json(response.into_body()).await)
    }

    /// Names of files currently in the uploads directory
    pub fn upload_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.uploads)
            .expect("Should list uploads")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn assessment_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM assessments")
            .fetch_one(&self.db)
            .await
            .unwrap()
    }

    /// Create a class through the API, returning its id
    pub async fn create_class(&self, year: &str, name: &str, teacher: &str) -> i64 {
        let body = json!({ "year": year, "name": name, "teacher_name": teacher });
        let (status, body) = self.post_json("/api/classes", body).await;
        assert_eq!(status, StatusCode::OK, "create class: {}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn create_student(&self, class_id: i64, name: &str) -> i64 {
        let uri = format!("/api/classes/{}/students", class_id);
        let (status, body) = self.post_json(&uri, json!({ "name": name })).await;
        assert_eq!(status, StatusCode::OK, "create student: {}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn create_subject(&self, class_id: i64, name: &str) -> i64 {
        let uri = format!("/api/classes/{}/subjects", class_id);
        let (status, body) = self.post_json(&uri, json!({ "name": name })).await;
        assert_eq!(status, StatusCode::OK, "create subject: {}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn create_item(&self, subject_id: i64, sk: &str, sp: &str) -> i64 {
        let uri = format!("/api/subjects/{}/dskp", subject_id);
        let (status, body) = self.post_json(&uri, json!({ "sk": sk, "sp": sp })).await;
        assert_eq!(status, StatusCode::OK, "create DSKP item: {}", body);
        body["id"].as_i64().unwrap()
    }

    /// Record one assessment through the multipart endpoint
    pub async fn record(
        &self,
        fixture: &Fixture,
        student_id: i64,
        tp_level: u8,
        skills: &str,
        note: &str,
        timestamp: &str,
    ) -> i64 {
        let form = MultipartBuilder::new()
            .text("student_id", &student_id.to_string())
            .text("subject_id", &fixture.english.to_string())
            .text("dskp_item_id", &fixture.listening.to_string())
            .text("tp_level", &tp_level.to_string())
            .text("skills", skills)
            .text("note", note)
            .text("timestamp", timestamp);
        let (status, body) = self.post_form("/api/assessments", form).await;
        assert_eq!(status, StatusCode::OK, "record assessment: {}", body);
        body["id"].as_i64().unwrap()
    }
}

/// Ids of the standard roster
pub struct Fixture {
    pub bestari: i64,
    pub cemerlang: i64,
    pub ali: i64,
    pub siti: i64,
    pub english: i64,
    pub listening: i64,
}

/// Year 4 Bestari (Ali, Siti, English with one DSKP item) plus an empty
/// second class
pub async fn seed(app: &TestApp) -> Fixture {
    let bestari = app.create_class("Year 4", "Bestari", "Ms. Tan").await;
    let cemerlang = app.create_class("Year 5", "Cemerlang", "Mr. Lim").await;
    let ali = app.create_student(bestari, "Ali").await;
    let siti = app.create_student(bestari, "Siti").await;
    let english = app.create_subject(bestari, "English").await;
    let listening = app
        .create_item(english, "Listening comprehension", "Identify main idea")
        .await;

    Fixture {
        bestari,
        cemerlang,
        ali,
        siti,
        english,
        listening,
    }
}

/// Test helper: Extract JSON body from response
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

pub async fn extract_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8")
}

/// Hand-assembled `multipart/form-data` body
pub struct MultipartBuilder {
    body: Vec<u8>,
}

const BOUNDARY: &str = "pbd-test-boundary-7MA4YWxkTrZu0gW";

impl MultipartBuilder {
    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(
        mut self,
        name: &str,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        let closing = format!("--{}--\r\n", BOUNDARY);
        self.body.extend_from_slice(closing.as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}
