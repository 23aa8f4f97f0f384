//! Typed assessment filter
//!
//! Query parameters are parsed into [`Predicate`] values first and only then
//! rendered into SQL. Every user-supplied value reaches the database as a
//! bound parameter; the SQL text itself comes from this module alone.
//!
//! Table aliases expected by [`AssessmentFilter::push_where`]:
//! `a` = assessments, `st` = students, `su` = subjects, `d` = dskp_items.

use chrono::{DateTime, Duration, Utc};
use pbd_common::time;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::ApiError;

/// Raw filter parameters as they arrive on the query string
///
/// Ids are kept as text: a malformed id is not an error, it just matches
/// nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssessmentParams {
    pub class_id: Option<String>,
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub skill: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// One conjunct of the assessment filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Class(i64),
    Student(i64),
    Subject(i64),
    /// Whole-tag match against the row's skill list
    Skill(String),
    /// Case-insensitive substring of student name, SK, SP or note
    ///
    /// Folding is SQLite `LIKE`'s: ASCII letters only, so `ALI` finds
    /// `Ali` but `élise` does not find `Élise`.
    Search(String),
    /// Timestamp at or after
    From(DateTime<Utc>),
    /// Timestamp strictly before
    Before(DateTime<Utc>),
    /// Always false
    NoMatch,
}

impl Predicate {
    fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::Class(id) => {
                builder.push("st.class_id = ").push_bind(*id);
            }
            Predicate::Student(id) => {
                builder.push("a.student_id = ").push_bind(*id);
            }
            Predicate::Subject(id) => {
                builder.push("a.subject_id = ").push_bind(*id);
            }
            Predicate::Skill(tag) => {
                builder
                    .push("instr(',' || a.skills || ',', ',' || ")
                    .push_bind(tag.clone())
                    .push(" || ',') > 0");
            }
            Predicate::Search(text) => {
                let pattern = format!("%{}%", escape_like(text));
                builder.push("(");
                for (i, column) in ["st.name", "d.sk", "d.sp", "a.note"].iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    builder
                        .push(*column)
                        .push(" LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\'");
                }
                builder.push(")");
            }
            Predicate::From(ts) => {
                builder
                    .push("a.timestamp >= ")
                    .push_bind(time::to_storage(ts));
            }
            Predicate::Before(ts) => {
                builder
                    .push("a.timestamp < ")
                    .push_bind(time::to_storage(ts));
            }
            Predicate::NoMatch => {
                builder.push("0 = 1");
            }
        }
    }
}

/// Conjunction of predicates; empty means "everything"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentFilter {
    predicates: Vec<Predicate>,
}

impl AssessmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Build a filter from query-string parameters
    ///
    /// Absent and blank parameters impose no constraint. A non-integer id
    /// yields [`Predicate::NoMatch`]. Only an unreadable date is an error.
    pub fn from_params(params: &AssessmentParams) -> Result<Self, ApiError> {
        let mut filter = Self::new();

        let id_params: [(&Option<String>, fn(i64) -> Predicate); 3] = [
            (&params.class_id, Predicate::Class),
            (&params.student_id, Predicate::Student),
            (&params.subject_id, Predicate::Subject),
        ];
        for (raw, make) in id_params {
            if let Some(value) = non_blank(raw) {
                filter = filter.with(match value.parse::<i64>() {
                    Ok(id) => make(id),
                    Err(_) => Predicate::NoMatch,
                });
            }
        }

        if let Some(skill) = non_blank(&params.skill) {
            filter = filter.with(Predicate::Skill(skill.to_string()));
        }

        if let Some(search) = non_blank(&params.search) {
            filter = filter.with(Predicate::Search(search.to_string()));
        }

        if let Some(from) = non_blank(&params.from) {
            let ts = time::parse_timestamp(from)
                .map_err(|_| ApiError::BadRequest(format!("Invalid 'from' date: {}", from)))?;
            filter = filter.with(Predicate::From(ts));
        }

        if let Some(to) = non_blank(&params.to) {
            let ts = time::parse_timestamp(to)
                .map_err(|_| ApiError::BadRequest(format!("Invalid 'to' date: {}", to)))?;
            // A bare date means "through the end of that day"
            let end = if time::parse_date(to).is_some() {
                ts + Duration::days(1)
            } else {
                ts
            };
            filter = filter.with(Predicate::Before(end));
        }

        Ok(filter)
    }

    /// Append ` WHERE ...` (nothing when the filter is empty)
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        for (i, predicate) in self.predicates.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            predicate.push_sql(builder);
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Escape LIKE wildcards so user text matches literally (`ESCAPE '\'`)
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> AssessmentParams {
        let mut p = AssessmentParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "class_id" => p.class_id = value,
                "student_id" => p.student_id = value,
                "subject_id" => p.subject_id = value,
                "skill" => p.skill = value,
                "search" => p.search = value,
                "from" => p.from = value,
                "to" => p.to = value,
                other => panic!("unknown param {}", other),
            }
        }
        p
    }

    fn sql_for(filter: &AssessmentFilter) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT 1");
        filter.push_where(&mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn test_empty_params_no_where_clause() {
        let filter = AssessmentFilter::from_params(&AssessmentParams::default()).unwrap();
        assert!(filter.predicates().is_empty());
        assert_eq!(sql_for(&filter), "SELECT 1");
    }

    #[test]
    fn test_blank_params_are_ignored() {
        let filter =
            AssessmentFilter::from_params(&params(&[("class_id", ""), ("search", "   ")])).unwrap();
        assert!(filter.predicates().is_empty());
    }

    #[test]
    fn test_ids_parsed() {
        let filter = AssessmentFilter::from_params(&params(&[
            ("class_id", "1"),
            ("student_id", " 2 "),
            ("subject_id", "3"),
        ]))
        .unwrap();
        assert_eq!(
            filter.predicates(),
            &[
                Predicate::Class(1),
                Predicate::Student(2),
                Predicate::Subject(3),
            ]
        );
    }

    #[test]
    fn test_malformed_id_matches_nothing() {
        let filter = AssessmentFilter::from_params(&params(&[("student_id", "abc")])).unwrap();
        assert_eq!(filter.predicates(), &[Predicate::NoMatch]);
        assert!(sql_for(&filter).ends_with("WHERE 0 = 1"));
    }

    #[test]
    fn test_predicates_are_conjunctive_and_bound() {
        let filter = AssessmentFilter::from_params(&params(&[
            ("class_id", "1"),
            ("skill", "Reading"),
            ("search", "x' OR 1=1 --"),
        ]))
        .unwrap();
        let sql = sql_for(&filter);

        assert!(sql.contains(" WHERE st.class_id = ?"));
        assert!(sql.contains(" AND instr(',' || a.skills || ',', ',' || ? || ',') > 0"));
        assert!(sql.contains(" AND (st.name LIKE ? ESCAPE '\\' OR d.sk LIKE ?"));
        assert!(
            !sql.contains("OR 1=1"),
            "user text leaked into SQL: {}",
            sql
        );
    }

    #[test]
    fn test_date_range() {
        let filter = AssessmentFilter::from_params(&params(&[
            ("from", "2024-03-01"),
            ("to", "2024-03-31"),
        ]))
        .unwrap();
        assert_eq!(
            filter.predicates(),
            &[
                Predicate::From(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
                Predicate::Before(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
            ]
        );
    }

    #[test]
    fn test_to_with_time_is_exclusive_bound() {
        let filter =
            AssessmentFilter::from_params(&params(&[("to", "2024-03-31T12:00:00Z")])).unwrap();
        let noon = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(filter.predicates(), &[Predicate::Before(noon)]);
    }

    #[test]
    fn test_malformed_date_rejected() {
        let result = AssessmentFilter::from_params(&params(&[("from", "last week")]));
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("C:\\"), "C:\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
