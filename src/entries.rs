use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use crate::domain::{Ledger, TimeEntry};
use crate::error::LedgerError;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Narrows the entry history for display. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub task_id: Option<String>,
    pub query: Option<String>,
}

impl EntryFilter {
    fn matches<Tz: TimeZone>(&self, entry: &TimeEntry, tz: &Tz) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        if let Some(task_id) = &self.task_id {
            if &entry.task_id != task_id {
                return false;
            }
        }

        let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
            return true;
        };
        let query = query.to_lowercase();
        entry.task_name.to_lowercase().contains(&query)
            || format_timestamp(entry.start_time, tz)
                .to_lowercase()
                .contains(&query)
    }
}

impl Ledger {
    /// Moves an entry to `task_id` and sets its length, keeping its start.
    pub fn edit_entry(
        &mut self,
        entry_id: &str,
        task_id: &str,
        duration_minutes: f64,
    ) -> Result<TimeEntry, LedgerError> {
        if !duration_minutes.is_finite() || duration_minutes < 0.0 {
            return Err(LedgerError::InvalidDuration(duration_minutes));
        }
        let new_task = self
            .task(task_id)
            .ok_or_else(|| LedgerError::TaskNotFound(task_id.to_string()))?;
        let (task_name, task_color) = (new_task.name.clone(), new_task.color.clone());
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id == entry_id)
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))?;

        let (old_task_id, old_duration_ms, start_time) = {
            let entry = &self.entries[index];
            (entry.task_id.clone(), entry.duration_ms, entry.start_time)
        };
        let (duration_ms, end_time) = end_after_minutes(start_time, duration_minutes)
            .ok_or(LedgerError::InvalidDuration(duration_minutes))?;

        if let Some(old_task) = self.task_mut(&old_task_id) {
            old_task.remove_time(old_duration_ms);
        }
        if let Some(new_task) = self.task_mut(task_id) {
            new_task.add_time(duration_ms);
        }

        let entry = &mut self.entries[index];
        entry.task_id = task_id.to_string();
        entry.task_name = task_name;
        entry.task_color = task_color;
        entry.duration_ms = duration_ms;
        entry.end_time = end_time;
        debug!(
            entry_id,
            from_task = %old_task_id,
            to_task = task_id,
            duration_ms,
            "edited entry"
        );

        Ok(entry.clone())
    }

    /// Removes an entry and takes its time off the task. Unknown ids are ignored.
    pub fn delete_entry(&mut self, entry_id: &str) -> Option<TimeEntry> {
        let index = self.entries.iter().position(|entry| entry.id == entry_id)?;
        let entry = self.entries.remove(index);

        if let Some(task) = self.task_mut(&entry.task_id) {
            task.remove_time(entry.duration_ms);
        }
        debug!(entry_id, task_id = %entry.task_id, "deleted entry");

        Some(entry)
    }

    /// Entries newest first, narrowed by `filter`. Timestamps are matched as
    /// they are shown in `tz`.
    pub fn find_entries<Tz: TimeZone>(&self, filter: &EntryFilter, tz: &Tz) -> Vec<&TimeEntry>
    where
        Tz::Offset: std::fmt::Display,
    {
        self.entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry, tz))
            .collect()
    }
}

/// Whole milliseconds in `minutes` and the end they give from `start`, or
/// `None` when the end falls outside the representable range.
fn end_after_minutes(start: DateTime<Utc>, minutes: f64) -> Option<(u64, DateTime<Utc>)> {
    let millis = (minutes * MS_PER_MINUTE).floor();
    if !(0.0..i64::MAX as f64).contains(&millis) {
        return None;
    }
    let millis = millis as i64;
    let end = start.checked_add_signed(Duration::try_milliseconds(millis)?)?;
    Some((u64::try_from(millis).ok()?, end))
}

/// `Jan 5, 3:04 PM` in the given zone.
pub fn format_timestamp<Tz: TimeZone>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp
        .with_timezone(tz)
        .format("%b %-d, %-I:%M %p")
        .to_string()
}
