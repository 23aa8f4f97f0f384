//! CSV report export

use chrono::{DateTime, FixedOffset, Utc};
use pbd_common::db::AssessmentRecord;
use pbd_common::{time, Error, Result};

/// Report columns, in order
pub const HEADERS: [&str; 8] = [
    "Student",
    "Subject",
    "SK",
    "SP",
    "TP Level",
    "Skills",
    "Note",
    "Timestamp",
];

/// Render assessments as CSV (header row first, rows in the given order)
///
/// Timestamps are shown as `YYYY-MM-DD HH:MM` in `offset`.
pub fn render_csv(records: &[AssessmentRecord], offset: &FixedOffset) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    wtr.write_record(HEADERS).map_err(csv_error)?;

    for record in records {
        let tp_level = record.tp_level.to_string();
        let skills = record.skills.to_storage();
        let timestamp = time::format_for_report(&record.timestamp, offset);

        wtr.write_record([
            record.student_name.as_str(),
            record.subject_name.as_str(),
            record.sk.as_str(),
            record.sp.as_str(),
            tp_level.as_str(),
            skills.as_str(),
            record.note.as_str(),
            timestamp.as_str(),
        ])
        .map_err(csv_error)?;
    }

    wtr.into_inner()
        .map_err(|e| Error::Internal(format!("Failed to finish CSV report: {}", e)))
}

/// Download name for a report generated at `now`
pub fn report_file_name(now: &DateTime<Utc>, offset: &FixedOffset) -> String {
    format!(
        "PBD_Report_{}.csv",
        now.with_timezone(offset).format("%Y-%m-%d")
    )
}

fn csv_error(err: csv::Error) -> Error {
    Error::Internal(format!("Failed to write CSV report: {}", err))
}
