//! Errors reported by ledger mutations.
//!
//! Every variant is a rejected request: the ledger is left exactly as it was.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("task name must not be empty")]
    EmptyTaskName,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Durations are entered in minutes and must be a finite, non-negative number.
    #[error("invalid duration: {0} minutes")]
    InvalidDuration(f64),

    #[error("task already running: {0}")]
    AlreadyTracking(String),

    #[error("no tasks created yet")]
    NoTasks,
}
