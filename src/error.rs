use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Failures surfaced by the tracker.
///
/// Structural problems (a bad roster, an unreadable batch) reject the whole
/// call. Row-level data problems never reach this type; they degrade to null
/// fields on the affected row.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Malformed roster upload or unparseable event batch.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown event row or unknown student.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resolve attempted on a row that is already matched.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence layer failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl TrackerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
