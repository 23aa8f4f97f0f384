//! Student queries

use pbd_common::db::Student;
use pbd_common::{Error, Result};
use sqlx::SqlitePool;

const STUDENT_COLUMNS: &str = "id, class_id, name, photo_url, notes";

pub async fn list_students(pool: &SqlitePool, class_id: i64) -> Result<Vec<Student>> {
    let students = sqlx::query_as::<_, Student>(&format!(
        "SELECT {} FROM students WHERE class_id = ? ORDER BY id",
        STUDENT_COLUMNS
    ))
    .bind(class_id)
    .fetch_all(pool)
    .await?;
    Ok(students)
}

pub async fn get_student(pool: &SqlitePool, student_id: i64) -> Result<Option<Student>> {
    let student = sqlx::query_as::<_, Student>(&format!(
        "SELECT {} FROM students WHERE id = ?",
        STUDENT_COLUMNS
    ))
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    Ok(student)
}

pub async fn insert_student(
    pool: &SqlitePool,
    class_id: i64,
    name: &str,
    notes: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO students (class_id, name, notes) VALUES (?, ?, ?)")
        .bind(class_id)
        .bind(name)
        .bind(notes)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Insert a whole roster in one transaction
///
/// Either every name becomes a student or none does.
pub async fn insert_students(
    pool: &SqlitePool,
    class_id: i64,
    names: &[String],
) -> Result<Vec<Student>> {
    let mut tx = pool.begin().await?;
    let mut students = Vec::with_capacity(names.len());

    for name in names {
        let result = sqlx::query("INSERT INTO students (class_id, name, notes) VALUES (?, ?, '')")
            .bind(class_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        students.push(Student {
            id: result.last_insert_rowid(),
            class_id,
            name: name.clone(),
            photo_url: None,
            notes: String::new(),
        });
    }

    tx.commit().await?;
    Ok(students)
}

/// Point a student's photo at `photo_url`
///
/// Returns the previous URL so the caller can discard the old file.
pub async fn set_photo(
    pool: &SqlitePool,
    student_id: i64,
    photo_url: &str,
) -> Result<Option<String>> {
    let mut tx = pool.begin().await?;

    let previous: Option<Option<String>> =
        sqlx::query_scalar("SELECT photo_url FROM students WHERE id = ?")
            .bind(student_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(previous) = previous else {
        return Err(Error::NotFound(format!("Student {} not found", student_id)));
    };

    sqlx::query("UPDATE students SET photo_url = ? WHERE id = ?")
        .bind(photo_url)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::classes::insert_class;
    use pbd_common::db::init::init_memory_database;

    #[tokio::test]
    async fn test_students_listed_per_class() {
        let pool = init_memory_database().await.unwrap();
        let bestari = insert_class(&pool, "Year 4", "Bestari", "").await.unwrap();
        let cemerlang = insert_class(&pool, "Year 5", "Cemerlang", "")
            .await
            .unwrap();

        insert_student(&pool, bestari, "Ali", "Sits at front")
            .await
            .unwrap();
        insert_student(&pool, cemerlang, "Siti", "").await.unwrap();

        let students = list_students(&pool, bestari).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Ali");
        assert_eq!(students[0].notes, "Sits at front");
        assert!(students[0].photo_url.is_none());
    }

    #[tokio::test]
    async fn test_insert_student_unknown_class_is_fk_violation() {
        let pool = init_memory_database().await.unwrap();

        let err = insert_student(&pool, 42, "Ghost", "").await.unwrap_err();
        assert!(err.is_foreign_key_violation());
    }

    #[tokio::test]
    async fn test_insert_students_batch() {
        let pool = init_memory_database().await.unwrap();
        let class_id = insert_class(&pool, "Year 4", "Bestari", "").await.unwrap();

        let names = vec!["Ali".to_string(), "Siti".to_string(), "Mei Ling".to_string()];
        let students = insert_students(&pool, class_id, &names).await.unwrap();

        assert_eq!(students.len(), 3);
        assert_eq!(list_students(&pool, class_id).await.unwrap(), students);
    }

    #[tokio::test]
    async fn test_insert_students_batch_is_atomic() {
        let pool = init_memory_database().await.unwrap();

        let names = vec!["Ali".to_string()];
        assert!(insert_students(&pool, 99, &names).await.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_set_photo_returns_previous() {
        let pool = init_memory_database().await.unwrap();
        let class_id = insert_class(&pool, "Year 4", "Bestari", "").await.unwrap();
        let ali = insert_student(&pool, class_id, "Ali", "").await.unwrap();

        assert_eq!(
            set_photo(&pool, ali, "/uploads/a.png").await.unwrap(),
            None
        );
        assert_eq!(
            set_photo(&pool, ali, "/uploads/b.png").await.unwrap(),
            Some("/uploads/a.png".to_string())
        );

        let student = get_student(&pool, ali).await.unwrap().unwrap();
        assert_eq!(student.photo_url.as_deref(), Some("/uploads/b.png"));
    }

    #[tokio::test]
    async fn test_set_photo_unknown_student() {
        let pool = init_memory_database().await.unwrap();

        let err = set_photo(&pool, 7, "/uploads/a.png").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
