//! Tests for database initialization
//!
//! Covers:
//! - Automatic database creation with the full schema
//! - Re-opening an existing database
//! - Foreign key and mastery-level enforcement on every connection

use pbd_common::db::init::{init_database, init_memory_database};
use tempfile::TempDir;

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("tracker.db");

    let result = init_database(&db_path).await;
    assert!(
        result.is_ok(),
        "Database initialization failed: {:?}",
        result.err()
    );
    assert!(db_path.exists(), "Database file was not created");

    let tables = table_names(&result.unwrap()).await;
    for expected in [
        "assessments",
        "classes",
        "dskp_items",
        "schema_version",
        "students",
        "subjects",
    ] {
        assert!(
            tables.iter().any(|t| t == expected),
            "missing table {}",
            expected
        );
    }
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tracker.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO classes (year, name, teacher_name) VALUES ('Year 4', 'Bestari', 'Ms. Tan')",
    )
    .execute(&pool1)
    .await
    .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(
        pool2.is_ok(),
        "Failed to open existing database: {:?}",
        pool2.err()
    );

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classes")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1, "Existing rows must survive re-initialization");
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let pool = init_memory_database().await.unwrap();

    let result = sqlx::query("INSERT INTO students (class_id, name) VALUES (999, 'Ghost')")
        .execute(&pool)
        .await;

    let err = result.expect_err("Insert against missing class must fail");
    let db_err = err.as_database_error().expect("database error");
    assert!(
        db_err.is_foreign_key_violation(),
        "unexpected error: {}",
        db_err
    );
}

#[tokio::test]
async fn test_tp_level_check_constraint() {
    let pool = init_memory_database().await.unwrap();

    for insert in [
        "INSERT INTO classes (id, name) VALUES (1, 'Bestari')",
        "INSERT INTO students (id, class_id, name) VALUES (1, 1, 'Ali')",
        "INSERT INTO subjects (id, class_id, name) VALUES (1, 1, 'English')",
        "INSERT INTO dskp_items (id, subject_id, sk, sp) VALUES (1, 1, 'SK', 'SP')",
    ] {
        sqlx::query(insert).execute(&pool).await.unwrap();
    }

    let bad = sqlx::query(
        "INSERT INTO assessments (student_id, subject_id, dskp_item_id, tp_level) \
         VALUES (1, 1, 1, 7)",
    )
    .execute(&pool)
    .await;
    assert!(bad.is_err(), "TP level 7 must be rejected");

    sqlx::query(
        "INSERT INTO assessments (student_id, subject_id, dskp_item_id, tp_level) \
         VALUES (1, 1, 1, 6)",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Default timestamp is fixed-width UTC text
    let ts: String = sqlx::query_scalar("SELECT timestamp FROM assessments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(ts.len(), "2024-03-01T08:30:00.000Z".len());
    assert!(ts.ends_with('Z'));
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let pool = init_memory_database().await.unwrap();
    pbd_common::db::init::create_schema(&pool).await.unwrap();

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(versions, 1);
}
