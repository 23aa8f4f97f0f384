//! Class queries

use pbd_common::db::Class;
use pbd_common::Result;
use sqlx::SqlitePool;

pub async fn list_classes(pool: &SqlitePool) -> Result<Vec<Class>> {
    let classes = sqlx::query_as::<_, Class>(
        "SELECT id, year, name, teacher_name FROM classes ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(classes)
}

pub async fn insert_class(
    pool: &SqlitePool,
    year: &str,
    name: &str,
    teacher_name: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO classes (year, name, teacher_name) VALUES (?, ?, ?)")
        .bind(year)
        .bind(name)
        .bind(teacher_name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn class_exists(pool: &SqlitePool, class_id: i64) -> Result<bool> {
    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classes WHERE id = ?")
        .bind(class_id)
        .fetch_one(pool)
        .await?;
    Ok(found > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbd_common::db::init::init_memory_database;

    #[tokio::test]
    async fn test_insert_and_list_in_id_order() {
        let pool = init_memory_database().await.unwrap();

        let first = insert_class(&pool, "Year 4", "Bestari", "Ms. Tan")
            .await
            .unwrap();
        let second = insert_class(&pool, "Year 5", "Cemerlang", "")
            .await
            .unwrap();

        let classes = list_classes(&pool).await.unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].id, first);
        assert_eq!(classes[0].teacher_name, "Ms. Tan");
        assert_eq!(classes[1].id, second);
    }

    #[tokio::test]
    async fn test_class_exists() {
        let pool = init_memory_database().await.unwrap();
        let id = insert_class(&pool, "Year 4", "Bestari", "")
            .await
            .unwrap();

        assert!(class_exists(&pool, id).await.unwrap());
        assert!(!class_exists(&pool, id + 100).await.unwrap());
    }
}
