//! Assessment store: filtered read, single insert, bulk insert
//!
//! Rows come back joined with student name, subject name and the DSKP
//! item's SK/SP, newest first (ties broken by id, newest first).

use pbd_common::db::{AssessmentRecord, NewAssessment, SkillSet, TpLevel};
use pbd_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::filter::AssessmentFilter;

const SELECT_JOINED: &str = "SELECT a.id, a.student_id, a.subject_id, a.dskp_item_id, a.tp_level, \
     a.skills, a.evidence_url, a.note, a.timestamp, \
     st.name AS student_name, su.name AS subject_name, d.sk, d.sp \
     FROM assessments a \
     JOIN students st ON a.student_id = st.id \
     JOIN subjects su ON a.subject_id = su.id \
     JOIN dskp_items d ON a.dskp_item_id = d.id";

/// All assessments satisfying every predicate of `filter`
pub async fn query(pool: &SqlitePool, filter: &AssessmentFilter) -> Result<Vec<AssessmentRecord>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_JOINED);
    filter.push_where(&mut builder);
    builder.push(" ORDER BY a.timestamp DESC, a.id DESC");

    let rows = builder.build().fetch_all(pool).await?;
    debug!(
        rows = rows.len(),
        predicates = filter.predicates().len(),
        "Assessment query"
    );

    rows.iter().map(record_from_row).collect()
}

/// Insert one assessment, returning its id
pub async fn insert_one(pool: &SqlitePool, new: &NewAssessment) -> Result<i64> {
    insert_with(pool, new).await
}

/// Insert a batch atomically, in order
///
/// Any failing row rolls back the whole batch. Returns the new ids in batch
/// order.
pub async fn insert_bulk(pool: &SqlitePool, batch: &[NewAssessment]) -> Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(batch.len());

    for new in batch {
        ids.push(insert_with(&mut *tx, new).await?);
    }

    tx.commit().await?;
    Ok(ids)
}

async fn insert_with<'e, E>(executor: E, new: &NewAssessment) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO assessments
            (student_id, subject_id, dskp_item_id, tp_level, skills, evidence_url, note, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.student_id)
    .bind(new.subject_id)
    .bind(new.dskp_item_id)
    .bind(i64::from(new.tp_level))
    .bind(new.skills.to_storage())
    .bind(new.evidence_url.as_deref())
    .bind(&new.note)
    .bind(time::to_storage(&new.timestamp))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

fn record_from_row(row: &SqliteRow) -> Result<AssessmentRecord> {
    let tp_level: i64 = row.try_get("tp_level")?;
    let skills: String = row.try_get("skills")?;
    let timestamp: String = row.try_get("timestamp")?;

    Ok(AssessmentRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        dskp_item_id: row.try_get("dskp_item_id")?,
        tp_level: TpLevel::try_from(tp_level)?,
        skills: SkillSet::parse(&skills),
        evidence_url: row.try_get("evidence_url")?,
        note: row.try_get("note")?,
        timestamp: time::from_storage(&timestamp)?,
        student_name: row.try_get("student_name")?,
        subject_name: row.try_get("subject_name")?,
        sk: row.try_get("sk")?,
        sp: row.try_get("sp")?,
    })
}
