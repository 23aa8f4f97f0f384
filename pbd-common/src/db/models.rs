//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Class {
    pub id: i64,
    pub year: String,
    pub name: String,
    pub teacher_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub class_id: i64,
    pub name: String,
    pub photo_url: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subject {
    pub id: i64,
    pub class_id: i64,
    pub name: String,
}

/// Curriculum item: a content standard (SK) paired with a learning standard (SP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DskpItem {
    pub id: i64,
    pub subject_id: i64,
    pub sk: String,
    pub sp: String,
}

/// Mastery level ("TP"), 1 (lowest) through 6 (highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct TpLevel(u8);

impl TpLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&level)
            .then_some(Self(level))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// All six levels in ascending order
    pub fn all() -> impl Iterator<Item = TpLevel> {
        (Self::MIN..=Self::MAX).map(TpLevel)
    }
}

impl TryFrom<i64> for TpLevel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(TpLevel::new)
            .ok_or_else(|| Error::InvalidInput(format!("TP level must be 1-6, got {}", value)))
    }
}

impl From<TpLevel> for i64 {
    fn from(level: TpLevel) -> Self {
        i64::from(level.0)
    }
}

impl fmt::Display for TpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TP{}", self.0)
    }
}

/// Ordered, de-duplicated list of skill tags
///
/// Stored comma-joined. Tags are trimmed and never contain a comma, so the
/// stored form splits back into exactly the same list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSkills", into = "Vec<String>")]
pub struct SkillSet(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSkills {
    Joined(String),
    List(Vec<String>),
}

impl From<RawSkills> for SkillSet {
    fn from(raw: RawSkills) -> Self {
        match raw {
            RawSkills::Joined(s) => SkillSet::parse(&s),
            RawSkills::List(tags) => tags.into_iter().collect(),
        }
    }
}

impl From<SkillSet> for Vec<String> {
    fn from(skills: SkillSet) -> Self {
        skills.0
    }
}

impl SkillSet {
    /// Parse the comma-joined form (`"Reading, Writing"`)
    pub fn parse(joined: &str) -> Self {
        joined.split(',').collect()
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag.trim())
    }

    /// Comma-joined storage form
    pub fn to_storage(&self) -> String {
        self.0.join(",")
    }
}

impl<S: AsRef<str>> FromIterator<S> for SkillSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags: Vec<String> = Vec::new();
        for raw in iter {
            for tag in raw.as_ref().split(',').map(str::trim) {
                if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
            }
        }
        SkillSet(tags)
    }
}

impl fmt::Display for SkillSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage())
    }
}

/// Values for one new assessment row
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub student_id: i64,
    pub subject_id: i64,
    pub dskp_item_id: i64,
    pub tp_level: TpLevel,
    pub skills: SkillSet,
    pub note: String,
    pub evidence_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Assessment joined with its student, subject and DSKP item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentRecord {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub dskp_item_id: i64,
    pub tp_level: TpLevel,
    pub skills: SkillSet,
    pub evidence_url: Option<String>,
    pub note: String,
    pub timestamp: DateTime<Utc>,
    pub student_name: String,
    pub subject_name: String,
    pub sk: String,
    pub sp: String,
}

/// Assessment count for one mastery level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TpCount {
    pub tp_level: TpLevel,
    pub count: i64,
}

/// Dashboard totals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_classes: i64,
    pub total_students: i64,
    pub total_assessments: i64,
    /// Always six entries, TP1..TP6
    pub tp_distribution: Vec<TpCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tp_level_bounds() {
        assert!(TpLevel::new(0).is_none());
        assert_eq!(TpLevel::new(1).map(TpLevel::value), Some(1));
        assert_eq!(TpLevel::new(6).map(TpLevel::value), Some(6));
        assert!(TpLevel::new(7).is_none());
        assert!(TpLevel::try_from(-1).is_err());
        assert!(TpLevel::try_from(256 + 4).is_err());
    }

    #[test]
    fn test_tp_level_display() {
        assert_eq!(TpLevel::try_from(4).unwrap().to_string(), "TP4");
    }

    #[test]
    fn test_tp_level_serde_is_integer() {
        let level: TpLevel = serde_json::from_str("5").unwrap();
        assert_eq!(serde_json::to_string(&level).unwrap(), "5");
        assert!(serde_json::from_str::<TpLevel>("9").is_err());
    }

    #[test]
    fn test_tp_level_all() {
        let all: Vec<u8> = TpLevel::all().map(TpLevel::value).collect();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_skill_set_parse_trims_and_dedups() {
        let skills = SkillSet::parse(" Reading,Writing, ,Reading ");
        assert_eq!(
            skills.tags(),
            &["Reading".to_string(), "Writing".to_string()]
        );
        assert_eq!(skills.to_storage(), "Reading,Writing");
    }

    #[test]
    fn test_skill_set_storage_roundtrip() {
        let skills: SkillSet = ["Listening", "Speaking"].into_iter().collect();
        assert_eq!(SkillSet::parse(&skills.to_storage()), skills);
    }

    #[test]
    fn test_skill_set_whole_tag_contains() {
        let skills = SkillSet::parse("Reading");
        assert!(skills.contains("Reading"));
        assert!(!skills.contains("Read"));
    }

    #[test]
    fn test_skill_set_empty() {
        assert!(SkillSet::parse("").is_empty());
        assert_eq!(SkillSet::default().to_storage(), "");
    }

    #[test]
    fn test_skill_set_deserializes_string_or_list() {
        let from_text: SkillSet = serde_json::from_str(r#""Reading,Writing""#).unwrap();
        let from_list: SkillSet = serde_json::from_str(r#"["Reading", "Writing"]"#).unwrap();
        assert_eq!(from_text, from_list);
        assert_eq!(
            serde_json::to_string(&from_list).unwrap(),
            r#"["Reading","Writing"]"#
        );
    }

    #[test]
    fn test_stats_uses_camel_case_keys() {
        let stats = Stats {
            total_classes: 1,
            total_students: 2,
            total_assessments: 0,
            tp_distribution: vec![],
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalClasses"], 1);
        assert_eq!(json["totalStudents"], 2);
        assert!(json["tpDistribution"].is_array());
    }
}
