//! Placement outcome tracker for Group Scholar cohorts.
//!
//! Students arrive as a master roster; placement, internship and training
//! events arrive as repeated CSV batches. Each event row is matched to a
//! student by identifier, email, phone or name, undecidable rows wait in an
//! unmatched queue for manual resolution, and class and student rollups are
//! computed on demand from the matched rows.

pub mod api;
pub mod db;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod models;
pub mod report;
pub mod roster;
pub mod summary;
pub mod tracker;

pub use crate::api::{build_router, AppState};
pub use crate::error::{Result, TrackerError};
pub use crate::tracker::Tracker;
