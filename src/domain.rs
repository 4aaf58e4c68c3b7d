use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::{Deserialize, Serialize};

const ID_LEN: usize = 8;

pub const SCHEMA_VERSION: u32 = 1;

/// Preset task colors, handed out in order as tasks are created.
pub const TASK_COLORS: [&str; 12] = [
    "#7c3aed", // violet
    "#2563eb", // blue
    "#0891b2", // cyan
    "#059669", // emerald
    "#65a30d", // lime
    "#ca8a04", // yellow
    "#ea580c", // orange
    "#dc2626", // red
    "#db2777", // pink
    "#9333ea", // purple
    "#6366f1", // indigo
    "#64748b", // slate
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    /// Sum of the durations of every entry that references this task.
    /// Time of a running session is not included.
    #[serde(default)]
    pub total_time_ms: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn total_time(&self) -> Duration {
        millis_to_duration(self.total_time_ms)
    }

    pub(crate) fn add_time(&mut self, duration_ms: u64) {
        self.total_time_ms = self.total_time_ms.saturating_add(duration_ms);
    }

    /// Removes time from the total, stopping at zero.
    pub(crate) fn remove_time(&mut self, duration_ms: u64) {
        self.total_time_ms = self.total_time_ms.saturating_sub(duration_ms);
    }
}

/// A completed tracking interval. The task name and color are captured when
/// the entry is created and are not refreshed when the task changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub task_id: String,
    pub task_name: String,
    #[serde(default)]
    pub task_color: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TimeEntry {
    pub(crate) fn record(task: &Task, start_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let duration_ms = elapsed_ms(start_time, now);
        Self {
            id: generate_id(),
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            task_color: task.color.clone(),
            start_time,
            end_time: start_time + millis_to_duration(duration_ms),
            duration_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        millis_to_duration(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub task_id: String,
    pub start_time: DateTime<Utc>,
}

impl ActiveSession {
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        millis_to_duration(elapsed_ms(self.start_time, now))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerHeader {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub active_sessions: Vec<ActiveSession>,
}

impl LedgerHeader {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            tasks: Vec::new(),
            active_sessions: Vec::new(),
        }
    }
}

impl Default for LedgerHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// The whole tracked state: tasks in display order, entries in the order they
/// were recorded, and the sessions that are currently running.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ledger {
    pub(crate) header: LedgerHeader,
    pub(crate) entries: Vec<TimeEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            header: LedgerHeader::new(),
            entries: Vec::new(),
        }
    }

    pub fn from_parts(header: LedgerHeader, entries: Vec<TimeEntry>) -> Self {
        let mut ledger = Self { header, entries };
        ledger.assign_missing_colors();
        ledger
    }

    pub fn tasks(&self) -> &[Task] {
        &self.header.tasks
    }

    pub fn entries(&self) -> &[TimeEntry] {
        &self.entries
    }

    pub fn active_sessions(&self) -> &[ActiveSession] {
        &self.header.active_sessions
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.header.tasks.iter().find(|task| task.id == id)
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.header.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn entry(&self, id: &str) -> Option<&TimeEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn session(&self, task_id: &str) -> Option<&ActiveSession> {
        self.header
            .active_sessions
            .iter()
            .find(|session| session.task_id == task_id)
    }

    pub fn is_tracking(&self, task_id: &str) -> bool {
        self.session(task_id).is_some()
    }

    /// Gives legacy tasks without a color one from the palette, chosen by
    /// their position in the task list.
    pub fn assign_missing_colors(&mut self) {
        for (index, task) in self.header.tasks.iter_mut().enumerate() {
            if task.color.trim().is_empty() {
                task.color = palette_color(index).to_string();
            }
        }
    }
}

pub fn palette_color(index: usize) -> &'static str {
    TASK_COLORS[index % TASK_COLORS.len()]
}

pub fn generate_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

pub fn elapsed_ms(start: DateTime<Utc>, stop: DateTime<Utc>) -> u64 {
    u64::try_from((stop - start).num_milliseconds()).unwrap_or(0)
}

pub fn millis_to_duration(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// Compact human format: `2h 5m`, `12m 30s`, `45s`.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn format_clock(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
