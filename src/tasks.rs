use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{Ledger, Task, TimeEntry, generate_id, palette_color};
use crate::error::LedgerError;
use crate::sessions::ClockOut;

/// Result of removing a task. `final_entry` holds the entry recorded when the
/// task was still running at the time of deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedTask {
    pub task: Task,
    pub final_entry: Option<TimeEntry>,
}

impl Ledger {
    pub fn create_task(&mut self, name: &str, now: DateTime<Utc>) -> Result<Task, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::EmptyTaskName);
        }

        let mut id = generate_id();
        while self.task(&id).is_some() {
            id = generate_id();
        }

        let task = Task {
            id,
            name: name.to_string(),
            color: palette_color(self.header.tasks.len()).to_string(),
            total_time_ms: 0,
            created_at: now,
        };
        self.header.tasks.push(task.clone());
        debug!(task_id = %task.id, name = %task.name, "created task");

        Ok(task)
    }

    /// Removes a task, clocking it out first if it is running. Entries that
    /// reference the task are kept. Unknown ids are ignored.
    pub fn delete_task(&mut self, task_id: &str, now: DateTime<Utc>) -> Option<DeletedTask> {
        let index = self.header.tasks.iter().position(|task| task.id == task_id)?;

        let final_entry = match self.clock_out(Some(task_id), now) {
            ClockOut::Recorded(entry) => Some(entry),
            ClockOut::Dropped { .. } | ClockOut::NotTracking => None,
        };

        let task = self.header.tasks.remove(index);
        debug!(task_id = %task.id, "deleted task");

        Some(DeletedTask { task, final_entry })
    }

    pub fn set_task_color(&mut self, task_id: &str, color: &str) -> Result<(), LedgerError> {
        let task = self
            .task_mut(task_id)
            .ok_or_else(|| LedgerError::TaskNotFound(task_id.to_string()))?;
        task.color = color.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::{Ledger, TASK_COLORS, palette_color};
    use crate::error::LedgerError;

    #[test]
    fn rejects_blank_names_without_changes() {
        let mut ledger = Ledger::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();

        assert_eq!(
            ledger.create_task("   ", now),
            Err(LedgerError::EmptyTaskName)
        );
        assert!(ledger.tasks().is_empty());
    }

    #[test]
    fn colors_cycle_through_the_palette() {
        let mut ledger = Ledger::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();

        for index in 0..=TASK_COLORS.len() {
            let task = ledger
                .create_task(&format!("Task {index}"), now)
                .expect("task should be created");
            assert_eq!(task.color, palette_color(index));
            assert_eq!(task.total_time_ms, 0);
            assert_eq!(task.created_at, now);
        }
        assert_eq!(ledger.tasks()[TASK_COLORS.len()].color, TASK_COLORS[0]);
    }

    #[test]
    fn trims_task_names() {
        let mut ledger = Ledger::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let task = ledger.create_task("  Writing ", now).expect("task");
        assert_eq!(task.name, "Writing");
    }

    #[test]
    fn deleting_running_task_records_final_entry_and_keeps_history() {
        let mut ledger = Ledger::new();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let task = ledger.create_task("Reading", start).expect("task");
        ledger.clock_in(&task.id, start).expect("clock in");

        let deleted = ledger
            .delete_task(&task.id, start + Duration::minutes(20))
            .expect("task should be deleted");

        let entry = deleted.final_entry.expect("running time should be kept");
        assert_eq!(entry.duration_ms, 20 * 60_000);
        assert_eq!(deleted.task.total_time_ms, 20 * 60_000);
        assert!(ledger.tasks().is_empty());
        assert!(ledger.active_sessions().is_empty());
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.entries()[0].task_name, "Reading");
    }

    #[test]
    fn deleting_unknown_task_is_a_no_op() {
        let mut ledger = Ledger::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        ledger.create_task("Reading", now).expect("task");

        assert!(ledger.delete_task("missing", now).is_none());
        assert_eq!(ledger.tasks().len(), 1);
    }

    #[test]
    fn recolors_existing_task_only() {
        let mut ledger = Ledger::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let task = ledger.create_task("Reading", now).expect("task");

        ledger
            .set_task_color(&task.id, "#000000")
            .expect("color should be set");
        assert_eq!(ledger.task(&task.id).map(|t| t.color.as_str()), Some("#000000"));
        assert_eq!(
            ledger.set_task_color("missing", "#000000"),
            Err(LedgerError::TaskNotFound("missing".to_string()))
        );
    }
}
