//! DSKP item queries

use pbd_common::db::DskpItem;
use pbd_common::Result;
use sqlx::SqlitePool;

pub async fn list_items(pool: &SqlitePool, subject_id: i64) -> Result<Vec<DskpItem>> {
    let items = sqlx::query_as::<_, DskpItem>(
        "SELECT id, subject_id, sk, sp FROM dskp_items WHERE subject_id = ? ORDER BY id",
    )
    .bind(subject_id)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

pub async fn insert_item(pool: &SqlitePool, subject_id: i64, sk: &str, sp: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO dskp_items (subject_id, sk, sp) VALUES (?, ?, ?)")
        .bind(subject_id)
        .bind(sk)
        .bind(sp)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Insert `(sk, sp)` pairs in one transaction
pub async fn insert_items(
    pool: &SqlitePool,
    subject_id: i64,
    pairs: &[(String, String)],
) -> Result<Vec<DskpItem>> {
    let mut tx = pool.begin().await?;
    let mut items = Vec::with_capacity(pairs.len());

    for (sk, sp) in pairs {
        let result = sqlx::query("INSERT INTO dskp_items (subject_id, sk, sp) VALUES (?, ?, ?)")
            .bind(subject_id)
            .bind(sk)
            .bind(sp)
            .execute(&mut *tx)
            .await?;
        items.push(DskpItem {
            id: result.last_insert_rowid(),
            subject_id,
            sk: sk.clone(),
            sp: sp.clone(),
        });
    }

    tx.commit().await?;
    Ok(items)
}
