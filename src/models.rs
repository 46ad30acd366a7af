use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_id: String,
    pub admission_year: Option<i32>,
    pub degree: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Placement,
    Internship,
    Training,
    Other,
}

impl EventType {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(normalize_token).as_deref() {
            Some("placement") | Some("placements") | Some("job") => Self::Placement,
            Some("internship") | Some("internships") | Some("intern") => Self::Internship,
            Some("training") | Some("trainings") | Some("workshop") => Self::Training,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placement => "placement",
            Self::Internship => "internship",
            Self::Training => "training",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventResult {
    Applied,
    Shortlisted,
    InProcess,
    Selected,
    Rejected,
    Unrecognized,
}

impl EventResult {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(normalize_token).as_deref() {
            Some("applied") => Self::Applied,
            Some("shortlisted") => Self::Shortlisted,
            Some("in_process") | Some("in_progress") | Some("inprocess") => Self::InProcess,
            Some("selected") | Some("placed") | Some("offered") => Self::Selected,
            Some("rejected") | Some("not_selected") => Self::Rejected,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Shortlisted => "shortlisted",
            Self::InProcess => "in_process",
            Self::Selected => "selected",
            Self::Rejected => "rejected",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Outcomes that count towards compensation figures.
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Selected)
    }
}

fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Matched,
    Unmatched,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "MATCHED",
            Self::Unmatched => "UNMATCHED",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        match raw {
            "MATCHED" => Some(Self::Matched),
            "UNMATCHED" => Some(Self::Unmatched),
            _ => None,
        }
    }
}

/// Which identity key produced a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Identifier,
    Email,
    Phone,
    Name,
    Manual,
}

impl MatchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Name => "name",
            Self::Manual => "manual",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        match raw {
            "identifier" => Some(Self::Identifier),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "name" => Some(Self::Name),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn confidence(self) -> f64 {
        match self {
            Self::Identifier | Self::Manual => 1.0,
            Self::Email => 0.9,
            Self::Phone => 0.85,
            Self::Name => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub student_id: Option<String>,
    pub status: MatchStatus,
    pub confidence: f64,
    pub method: Option<MatchMethod>,
}

impl MatchDecision {
    pub fn matched(student_id: &str, method: MatchMethod) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            status: MatchStatus::Matched,
            confidence: method.confidence(),
            method: Some(method),
        }
    }

    pub fn unmatched() -> Self {
        Self {
            student_id: None,
            status: MatchStatus::Unmatched,
            confidence: 0.0,
            method: None,
        }
    }
}

/// Identity keys exactly as they appeared in the uploaded row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportedIdentity {
    pub student_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub row_id: Uuid,
    pub seq: i64,
    pub student_id: Option<String>,
    pub class_id: Option<String>,
    pub reported: ReportedIdentity,
    pub company: Option<String>,
    pub event_type: EventType,
    pub result: EventResult,
    pub compensation: Option<f64>,
    pub event_date: Option<NaiveDate>,
    pub match_status: MatchStatus,
    pub match_method: Option<MatchMethod>,
    pub confidence: f64,
    pub fingerprint: String,
    pub ingested_at: DateTime<Utc>,
}

impl EventRow {
    pub fn is_matched(&self) -> bool {
        self.match_status == MatchStatus::Matched
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInfo {
    pub class_id: String,
    pub total_students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub class_id: String,
    pub total_students: usize,
    pub placed_count: usize,
    pub internship_count: usize,
    pub trained_count: usize,
    pub not_placed_count: usize,
    pub total_events: usize,
    pub outcome_counts: BTreeMap<EventResult, usize>,
    pub event_type_counts: BTreeMap<EventType, usize>,
    pub max_lpa: Option<f64>,
    pub avg_lpa_placed: Option<f64>,
    pub companies: Vec<String>,
    pub company_breakdown: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentSummary {
    pub total_events: usize,
    pub placements: usize,
    pub internships: usize,
    pub trainings: usize,
    pub offers: usize,
    pub placed: bool,
    pub outcome_counts: BTreeMap<EventResult, usize>,
    pub max_lpa: Option<f64>,
    pub avg_lpa_placed: Option<f64>,
    pub companies: Vec<String>,
    pub last_company: Option<String>,
    pub last_result: Option<EventResult>,
}

/// A roster entry with its rollup embedded, as listed per class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRow {
    #[serde(flatten)]
    pub student: Student,
    #[serde(flatten)]
    pub summary: StudentSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    pub student: Student,
    pub events: Vec<EventRow>,
    pub summary: StudentSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterReplaced {
    #[serde(rename = "rows")]
    pub accepted: usize,
    pub roster_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub rows: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub roster_version: u64,
    #[serde(rename = "data")]
    pub events: Vec<EventRow>,
}
