//! Dashboard statistics

use pbd_common::db::{Stats, TpCount, TpLevel};
use pbd_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Totals plus a per-level histogram with all six levels present
pub async fn fetch_stats(pool: &SqlitePool) -> Result<Stats> {
    let total_classes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classes")
        .fetch_one(pool)
        .await?;
    let total_students: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
        .fetch_one(pool)
        .await?;

    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT tp_level, COUNT(*) FROM assessments GROUP BY tp_level")
            .fetch_all(pool)
            .await?;
    let counts: HashMap<i64, i64> = rows.into_iter().collect();

    let tp_distribution: Vec<TpCount> = TpLevel::all()
        .map(|tp_level| TpCount {
            tp_level,
            count: counts.get(&i64::from(tp_level)).copied().unwrap_or(0),
        })
        .collect();
    let total_assessments = tp_distribution.iter().map(|c| c.count).sum();

    Ok(Stats {
        total_classes,
        total_students,
        total_assessments,
        tp_distribution,
    })
}
