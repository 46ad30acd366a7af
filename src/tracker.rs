//! The matching and reconciliation engine.
//!
//! Lock order is always roster, then event log, then a single row:
//!
//! - roster replace holds the roster write lock, so it waits for every
//!   in-flight ingest, resolve or summary and blocks new ones until the swap;
//! - ingest holds the roster read lock and appends under the log write lock;
//! - resolve holds the roster and log read locks plus the target row's write
//!   lock;
//! - summaries hold the roster and log read locks and read each row under its
//!   own read lock, so they never see a half-resolved row.
//!
//! When a database pool is attached every mutation is written there first and
//! applied in memory only after the write commits. Row sequence numbers then
//! come from the database, so other processes writing to the same schema
//! never collide with this one; their rows show up here after a reload.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{Result, TrackerError};
use crate::ingest::RawEventRow;
use crate::matcher::match_row;
use crate::models::{
    ClassInfo, ClassSummary, EventRow, IngestReport, MatchMethod, MatchStatus, RosterReplaced,
    Student, StudentProfile, StudentRow, StudentSummary,
};
use crate::roster::{normalize_identifier, Roster};
use crate::summary;

#[derive(Debug, Default)]
struct EventLog {
    rows: Vec<Arc<RwLock<EventRow>>>,
    index: HashMap<Uuid, usize>,
}

impl EventLog {
    fn push(&mut self, row: EventRow) {
        self.index.insert(row.row_id, self.rows.len());
        self.rows.push(Arc::new(RwLock::new(row)));
    }

    fn get(&self, row_id: &Uuid) -> Option<Arc<RwLock<EventRow>>> {
        self.index.get(row_id).map(|&at| Arc::clone(&self.rows[at]))
    }

    fn next_seq(&self) -> i64 {
        self.rows.len() as i64
    }

    async fn snapshot(&self) -> Vec<EventRow> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            rows.push(row.read().await.clone());
        }
        rows
    }
}

#[derive(Debug)]
pub struct Tracker {
    roster: RwLock<Arc<Roster>>,
    events: RwLock<EventLog>,
    store: Option<PgPool>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Tracker {
    pub fn in_memory() -> Self {
        Self {
            roster: RwLock::new(Arc::new(Roster::default())),
            events: RwLock::new(EventLog::default()),
            store: None,
        }
    }

    /// Restores roster and event history from the database.
    pub async fn load(pool: PgPool) -> Result<Self> {
        let students = db::load_students(&pool).await?;
        let roster = if students.is_empty() {
            Roster::default()
        } else {
            Roster::build(students, 1)?
        };

        let mut log = EventLog::default();
        for row in db::load_events(&pool).await? {
            log.push(row);
        }
        info!(
            students = roster.len(),
            events = log.rows.len(),
            "restored tracker state from database"
        );

        Ok(Self {
            roster: RwLock::new(Arc::new(roster)),
            events: RwLock::new(log),
            store: Some(pool),
        })
    }

    pub async fn roster(&self) -> Arc<Roster> {
        Arc::clone(&*self.roster.read().await)
    }

    /// Swaps in a whole new roster. Nothing changes if validation fails.
    pub async fn replace_roster(&self, students: Vec<Student>) -> Result<RosterReplaced> {
        let mut current = self.roster.write().await;
        let roster = Roster::build(students, current.version() + 1)?;

        if let Some(pool) = &self.store {
            db::replace_students(pool, roster.students())
                .await
                .map_err(storage_failure)?;
        }

        let replaced = RosterReplaced {
            accepted: roster.len(),
            roster_version: roster.version(),
        };
        info!(
            accepted = replaced.accepted,
            version = replaced.roster_version,
            "roster replaced"
        );
        *current = Arc::new(roster);
        Ok(replaced)
    }

    /// Matches and records one uploaded batch.
    pub async fn ingest(&self, class_hint: Option<&str>, raw_rows: Vec<RawEventRow>) -> Result<IngestReport> {
        let roster = self.roster.read().await;
        let mut log = self.events.write().await;

        let ingested_at = Utc::now();
        let first_seq = log.next_seq();
        let mut events: Vec<EventRow> = raw_rows
            .into_iter()
            .enumerate()
            .map(|(offset, raw)| {
                let reported = raw.identity(class_hint);
                let decision = match_row(&roster, &reported);
                let class_id = decision
                    .student_id
                    .as_deref()
                    .and_then(|id| roster.class_of(id))
                    .map(str::to_string);
                raw.into_event(reported, decision, class_id, first_seq + offset as i64, ingested_at)
            })
            .collect();

        if let Some(pool) = &self.store {
            let seqs = db::insert_events(pool, &events)
                .await
                .map_err(storage_failure)?;
            for (event, seq) in events.iter_mut().zip(seqs) {
                event.seq = seq;
            }
        }

        let matched_count = events.iter().filter(|event| event.is_matched()).count();
        let report = IngestReport {
            rows: events.len(),
            matched_count,
            unmatched_count: events.len() - matched_count,
            roster_version: roster.version(),
            events: events.clone(),
        };
        for event in events {
            log.push(event);
        }

        info!(
            rows = report.rows,
            matched = report.matched_count,
            unmatched = report.unmatched_count,
            "ingested event batch"
        );
        Ok(report)
    }

    /// Unmatched rows in ingestion order.
    pub async fn list_unmatched(&self) -> Vec<EventRow> {
        let log = self.events.read().await;
        let mut unmatched = Vec::new();
        for row in &log.rows {
            let row = row.read().await;
            if !row.is_matched() {
                unmatched.push(row.clone());
            }
        }
        unmatched
    }

    /// Binds an unmatched row to a roster student.
    ///
    /// Already matched rows are refused with a conflict and keep their binding.
    pub async fn resolve(&self, row_id: Uuid, student_id: &str) -> Result<EventRow> {
        let roster = self.roster.read().await;
        let log = self.events.read().await;
        let handle = log
            .get(&row_id)
            .ok_or_else(|| TrackerError::not_found(format!("event row {row_id} does not exist")))?;
        let mut row = handle.write().await;

        if row.match_status == MatchStatus::Matched {
            warn!(%row_id, "refused to re-resolve a matched row");
            return Err(TrackerError::Conflict(format!(
                "event row {row_id} is already matched"
            )));
        }
        let student = roster.lookup_by_identifier(student_id).ok_or_else(|| {
            TrackerError::not_found(format!("student {} is not on the roster", student_id.trim()))
        })?;

        let mut resolved = row.clone();
        resolved.student_id = Some(student.student_id.clone());
        resolved.class_id = Some(student.class_id.clone());
        resolved.match_status = MatchStatus::Matched;
        resolved.match_method = Some(MatchMethod::Manual);
        resolved.confidence = MatchMethod::Manual.confidence();

        if let Some(pool) = &self.store {
            let updated = db::mark_resolved(pool, &resolved)
                .await
                .map_err(storage_failure)?;
            if !updated {
                return Err(TrackerError::Conflict(format!(
                    "event row {row_id} is already matched"
                )));
            }
        }

        *row = resolved.clone();
        info!(%row_id, student_id = %student.student_id, "resolved unmatched row");
        Ok(resolved)
    }

    pub async fn list_classes(&self) -> Vec<ClassInfo> {
        self.roster.read().await.classes()
    }

    pub async fn class_summary(&self, class_id: &str) -> ClassSummary {
        let (roster, events) = self.consistent_view().await;
        summary::class_summary(class_id, &roster, &events)
    }

    /// Matched rows of one class, newest first.
    pub async fn class_events(&self, class_id: &str) -> Vec<EventRow> {
        let (roster, events) = self.consistent_view().await;
        let mut scoped: Vec<EventRow> = summary::class_events(class_id, &roster, &events)
            .cloned()
            .collect();
        scoped.sort_by(|a, b| b.seq.cmp(&a.seq));
        scoped
    }

    /// Roster entries of one class, each with its rollup embedded.
    pub async fn class_students(&self, class_id: &str) -> Vec<StudentRow> {
        let (roster, events) = self.consistent_view().await;
        roster
            .class_members(class_id)
            .into_iter()
            .map(|student| StudentRow {
                summary: summary::student_summary(&student.student_id, &roster, &events),
                student: student.clone(),
            })
            .collect()
    }

    pub async fn student_summary(&self, student_id: &str) -> Result<StudentSummary> {
        Ok(self.student_profile(student_id).await?.summary)
    }

    pub async fn student_profile(&self, student_id: &str) -> Result<StudentProfile> {
        let (roster, events) = self.consistent_view().await;
        let student = roster
            .lookup_by_identifier(student_id)
            .cloned()
            .ok_or_else(|| {
                TrackerError::not_found(format!("student {} is not on the roster", student_id.trim()))
            })?;
        let summary = summary::student_summary(&student.student_id, &roster, &events);
        let key = normalize_identifier(&student.student_id);
        let own = summary::attributable(&roster, &events)
            .filter(|event| {
                event
                    .student_id
                    .as_deref()
                    .is_some_and(|id| normalize_identifier(id) == key)
            })
            .cloned()
            .collect();

        Ok(StudentProfile {
            student,
            events: own,
            summary,
        })
    }

    /// Roster snapshot and event rows read under the same roster read lock.
    async fn consistent_view(&self) -> (Arc<Roster>, Vec<EventRow>) {
        let roster = self.roster.read().await;
        let events = self.events.read().await.snapshot().await;
        (Arc::clone(&*roster), events)
    }
}

fn storage_failure(err: anyhow::Error) -> TrackerError {
    error!(error = ?err, "storage write failed");
    TrackerError::Storage(err)
}
