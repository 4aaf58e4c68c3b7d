use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::domain::{ActiveSession, Ledger, TimeEntry};
use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq)]
pub enum ClockOut {
    /// The session was closed and turned into an entry.
    Recorded(TimeEntry),
    /// The session belonged to a task that no longer exists and was discarded.
    Dropped { task_id: String },
    NotTracking,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Toggle {
    ClockedIn(ActiveSession),
    ClockedOut(ClockOut),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub task_id: String,
    pub task_name: String,
    pub task_color: String,
    pub elapsed: Duration,
}

impl Ledger {
    pub fn clock_in(
        &mut self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActiveSession, LedgerError> {
        if self.task(task_id).is_none() {
            return Err(LedgerError::TaskNotFound(task_id.to_string()));
        }

        if self.is_tracking(task_id) {
            return Err(LedgerError::AlreadyTracking(task_id.to_string()));
        }

        let session = ActiveSession {
            task_id: task_id.to_string(),
            start_time: now,
        };
        self.header.active_sessions.push(session.clone());
        debug!(task_id, "clocked in");

        Ok(session)
    }

    /// Stops the session for `task_id`, or the oldest running session when no
    /// task is named.
    pub fn clock_out(&mut self, task_id: Option<&str>, now: DateTime<Utc>) -> ClockOut {
        let index = match task_id {
            Some(task_id) => self
                .header
                .active_sessions
                .iter()
                .position(|session| session.task_id == task_id),
            None if self.header.active_sessions.is_empty() => None,
            None => Some(0),
        };
        let Some(index) = index else {
            return ClockOut::NotTracking;
        };

        let session = self.header.active_sessions.remove(index);
        let Some(task) = self.task_mut(&session.task_id) else {
            warn!(task_id = %session.task_id, "dropping session of deleted task");
            return ClockOut::Dropped {
                task_id: session.task_id,
            };
        };

        let entry = TimeEntry::record(task, session.start_time, now);
        task.add_time(entry.duration_ms);
        debug!(
            task_id = %entry.task_id,
            duration_ms = entry.duration_ms,
            "clocked out"
        );
        self.entries.push(entry.clone());

        ClockOut::Recorded(entry)
    }

    /// Quick punch: stops the oldest running session if there is one,
    /// otherwise starts the task used last (or the first task).
    pub fn toggle(&mut self, now: DateTime<Utc>) -> Result<Toggle, LedgerError> {
        if !self.header.active_sessions.is_empty() {
            return Ok(Toggle::ClockedOut(self.clock_out(None, now)));
        }

        let task_id = self
            .entries
            .last()
            .and_then(|entry| self.task(&entry.task_id))
            .or_else(|| self.header.tasks.first())
            .map(|task| task.id.clone())
            .ok_or(LedgerError::NoTasks)?;

        self.clock_in(&task_id, now).map(Toggle::ClockedIn)
    }

    /// Recorded total plus the time of the running session, if any.
    pub fn live_total(&self, task_id: &str, now: DateTime<Utc>) -> Option<Duration> {
        let task = self.task(task_id)?;
        let running = self
            .session(task_id)
            .map(|session| session.elapsed(now))
            .unwrap_or_else(Duration::zero);
        Some(task.total_time() + running)
    }

    /// Running sessions with their elapsed time, skipping sessions whose task
    /// is gone.
    pub fn session_status(&self, now: DateTime<Utc>) -> Vec<SessionStatus> {
        self.header
            .active_sessions
            .iter()
            .filter_map(|session| {
                let task = self.task(&session.task_id)?;
                Some(SessionStatus {
                    task_id: task.id.clone(),
                    task_name: task.name.clone(),
                    task_color: task.color.clone(),
                    elapsed: session.elapsed(now),
                })
            })
            .collect()
    }
}
