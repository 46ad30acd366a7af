//! CSV upload parsing.
//!
//! Structural problems (not CSV, ragged rows, no usable columns) reject the
//! whole file. Bad cells inside a well-formed file only null out that field.

use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, TrackerError};
use crate::models::{
    EventResult, EventRow, EventType, MatchDecision, ReportedIdentity, Student,
};
use crate::roster::non_blank;

const EVENT_COLUMNS: &[&str] = &[
    "student_id",
    "student_identifier",
    "name",
    "email",
    "phone",
    "class_id",
    "class",
    "company",
    "company_or_organizer",
    "event_type",
    "result",
    "compensation",
    "lpa",
    "event_date",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEventRow {
    #[serde(default, alias = "student_identifier")]
    pub student_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "class")]
    pub class_id: Option<String>,
    #[serde(default, alias = "company_or_organizer")]
    pub company: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, alias = "lpa")]
    pub compensation: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStudentRow {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, alias = "class")]
    class_id: Option<String>,
    #[serde(default)]
    admission_year: Option<String>,
    #[serde(default)]
    degree: Option<String>,
}

pub fn parse_students(bytes: &[u8]) -> Result<Vec<Student>> {
    let mut reader = reader_for(bytes)?;
    let headers = reader.headers().map_err(structural)?.clone();
    for required in ["student_id", "name"] {
        if !headers.iter().any(|h| h == required) {
            return Err(TrackerError::validation(format!(
                "roster file has no {required} column"
            )));
        }
    }
    if !headers.iter().any(|h| h == "class_id" || h == "class") {
        return Err(TrackerError::validation("roster file has no class_id column"));
    }

    let mut students = Vec::new();
    for record in reader.deserialize::<RawStudentRow>() {
        let row = record.map_err(structural)?;
        students.push(Student {
            student_id: row.student_id.unwrap_or_default(),
            name: row.name.unwrap_or_default(),
            email: non_blank(row.email),
            phone: non_blank(row.phone),
            class_id: row.class_id.unwrap_or_default(),
            admission_year: non_blank(row.admission_year).and_then(|y| y.parse().ok()),
            degree: non_blank(row.degree),
        });
    }
    Ok(students)
}

pub fn parse_events(bytes: &[u8]) -> Result<Vec<RawEventRow>> {
    let mut reader = reader_for(bytes)?;
    let headers = reader.headers().map_err(structural)?.clone();
    if !headers.iter().any(|h| EVENT_COLUMNS.contains(&h)) {
        return Err(TrackerError::validation(
            "event file has none of the recognized columns",
        ));
    }

    reader
        .deserialize::<RawEventRow>()
        .map(|record| record.map_err(structural))
        .collect()
}

/// Reader over `bytes` whose header row has been normalized to snake case.
fn reader_for(bytes: &[u8]) -> Result<csv::Reader<&[u8]>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
    let headers = reader.headers().map_err(structural)?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(TrackerError::validation("file has no header row"));
    }
    let normalized: StringRecord = headers.iter().map(normalize_header).collect();
    reader.set_headers(normalized);
    Ok(reader)
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn structural(err: csv::Error) -> TrackerError {
    let reason = match err.kind() {
        csv::ErrorKind::UnequalLengths { .. } => "rows have inconsistent column counts",
        csv::ErrorKind::Utf8 { .. } => "file is not valid UTF-8 text",
        csv::ErrorKind::Deserialize { .. } => "a row could not be read",
        _ => "file is not well-formed CSV",
    };
    TrackerError::validation(reason)
}

impl RawEventRow {
    /// Identity keys with blanks dropped; the class hint fills a missing class.
    pub fn identity(&self, class_hint: Option<&str>) -> ReportedIdentity {
        ReportedIdentity {
            student_id: non_blank(self.student_id.clone()),
            name: non_blank(self.name.clone()),
            email: non_blank(self.email.clone()),
            phone: non_blank(self.phone.clone()),
            class_id: non_blank(self.class_id.clone())
                .or_else(|| non_blank(class_hint.map(str::to_string))),
        }
    }

    /// Builds the stored row for this upload line from its match decision.
    pub fn into_event(
        self,
        reported: ReportedIdentity,
        decision: MatchDecision,
        class_id: Option<String>,
        seq: i64,
        ingested_at: DateTime<Utc>,
    ) -> EventRow {
        let fingerprint = fingerprint(&self);
        EventRow {
            row_id: Uuid::new_v4(),
            seq,
            student_id: decision.student_id,
            class_id,
            reported,
            company: non_blank(self.company),
            event_type: EventType::parse(self.event_type.as_deref()),
            result: EventResult::parse(self.result.as_deref()),
            compensation: self.compensation.as_deref().and_then(parse_compensation),
            event_date: self.event_date.as_deref().and_then(parse_event_date),
            match_status: decision.status,
            match_method: decision.method,
            confidence: decision.confidence,
            fingerprint,
            ingested_at,
        }
    }
}

/// Accepts plain numbers and an optional trailing `LPA` unit.
pub fn parse_compensation(raw: &str) -> Option<f64> {
    let lowered = raw.trim().to_lowercase();
    let number = lowered.strip_suffix("lpa").unwrap_or(lowered.as_str()).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// SHA-256 over the normalized content of an upload line.
///
/// Identical lines in different uploads share a fingerprint, which lets a
/// reader spot re-uploaded events without the tracker dropping them.
pub fn fingerprint(row: &RawEventRow) -> String {
    let parts = [
        &row.student_id,
        &row.event_type,
        &row.company,
        &row.event_date,
        &row.email,
        &row.name,
        &row.result,
        &row.compensation,
    ];
    let joined = parts
        .iter()
        .map(|part| part.as_deref().unwrap_or("").trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    format!("{:x}", Sha256::digest(joined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roster_with_messy_headers() {
        let csv = "Student_ID, Name ,Email,Phone,Class,Admission Year,Degree\n\
                   STU1,Ann,ann@example.com,98765,A,2022,B.Tech\n\
                   STU2,Bo,,,A,not-a-year,\n";
        let students = parse_students(csv.as_bytes()).unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].class_id, "A");
        assert_eq!(students[0].admission_year, Some(2022));
        assert_eq!(students[1].email, None);
        assert_eq!(students[1].admission_year, None);
        assert_eq!(students[1].degree, None);
    }

    #[test]
    fn roster_without_class_column_is_rejected() {
        let err = parse_students(b"student_id,name\nSTU1,Ann\n").unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[test]
    fn event_aliases_are_understood() {
        let csv = "student_identifier,company_or_organizer,event_type,result,lpa\n\
                   STU1,Acme,Placement,Selected,6\n";
        let rows = parse_events(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id.as_deref(), Some("STU1"));
        assert_eq!(rows[0].company.as_deref(), Some("Acme"));
        assert_eq!(rows[0].compensation.as_deref(), Some("6"));
    }

    #[test]
    fn bad_compensation_degrades_to_null() {
        assert_eq!(parse_compensation("6.5"), Some(6.5));
        assert_eq!(parse_compensation(" 12 LPA"), Some(12.0));
        assert_eq!(parse_compensation("six"), None);
        assert_eq!(parse_compensation("-3"), None);
        assert_eq!(parse_compensation("NaN"), None);
    }

    #[test]
    fn dates_parse_leniently() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_event_date("2024-03-09"), expected);
        assert_eq!(parse_event_date("09/03/2024"), expected);
        assert_eq!(parse_event_date("soon"), None);
    }

    #[test]
    fn ragged_rows_reject_the_file() {
        let csv = "student_id,company\nSTU1,Acme\nSTU2\n";
        let err = parse_events(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("inconsistent column counts"));
    }

    #[test]
    fn file_without_known_columns_is_rejected() {
        let err = parse_events(b"foo,bar\n1,2\n").unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[test]
    fn class_hint_only_fills_missing_class() {
        let row = RawEventRow {
            class_id: Some("B".into()),
            ..RawEventRow::default()
        };
        assert_eq!(row.identity(Some("A")).class_id.as_deref(), Some("B"));
        assert_eq!(
            RawEventRow::default().identity(Some("A")).class_id.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn fingerprint_ignores_case_and_padding() {
        let a = RawEventRow {
            company: Some("Acme ".into()),
            result: Some("Selected".into()),
            ..RawEventRow::default()
        };
        let b = RawEventRow {
            company: Some("acme".into()),
            result: Some("selected".into()),
            ..RawEventRow::default()
        };
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }
}
