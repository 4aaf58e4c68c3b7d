//! Punch-clock time tracking: tasks, concurrent clock-in sessions, an editable
//! entry history with running totals, and day/week/month/year summaries.

pub mod calendar;
pub mod domain;
pub mod entries;
pub mod error;
pub mod ledgers;
pub mod sessions;
pub mod storage;
pub mod tasks;
pub mod tracker;

pub use calendar::{Bucket, Calendar, Period, TaskTime};
pub use domain::{ActiveSession, Ledger, Task, TimeEntry, format_clock, format_duration};
pub use entries::EntryFilter;
pub use error::LedgerError;
pub use sessions::{ClockOut, SessionStatus, Toggle};
pub use storage::{FileStore, LedgerStore, MemoryStore, StorageError};
pub use tracker::{ManualClock, SystemClock, TimeSource, Tracker};
