//! Subject queries

use pbd_common::db::Subject;
use pbd_common::Result;
use sqlx::SqlitePool;

pub async fn list_subjects(pool: &SqlitePool, class_id: i64) -> Result<Vec<Subject>> {
    let subjects = sqlx::query_as::<_, Subject>(
        "SELECT id, class_id, name FROM subjects WHERE class_id = ? ORDER BY id",
    )
    .bind(class_id)
    .fetch_all(pool)
    .await?;
    Ok(subjects)
}

pub async fn insert_subject(pool: &SqlitePool, class_id: i64, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO subjects (class_id, name) VALUES (?, ?)")
        .bind(class_id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn subject_exists(pool: &SqlitePool, subject_id: i64) -> Result<bool> {
    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE id = ?")
        .bind(subject_id)
        .fetch_one(pool)
        .await?;
    Ok(found > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::classes::insert_class;
    use pbd_common::db::init::init_memory_database;

    #[tokio::test]
    async fn test_subjects_per_class() {
        let pool = init_memory_database().await.unwrap();
        let class_id = insert_class(&pool, "Year 4", "Bestari", "")
            .await
            .unwrap();

        let english = insert_subject(&pool, class_id, "English")
            .await
            .unwrap();
        insert_subject(&pool, class_id, "Mathematics")
            .await
            .unwrap();

        let subjects = list_subjects(&pool, class_id).await.unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].id, english);
        assert!(subject_exists(&pool, english).await.unwrap());
        assert!(list_subjects(&pool, class_id + 1).await.unwrap().is_empty());
    }
}
