//! The owner of a ledger.
//!
//! [`Tracker`] holds the ledger behind a single read/write lock. Every
//! mutation runs under the write lock: it changes the ledger and then hands it
//! to the [`LedgerStore`]. Readers share the read lock, so they always see the
//! ledger either before or after a whole mutation.
//!
//! A failed save does not undo the mutation. The tracker remembers that the
//! store is behind and [`Tracker::flush`] retries with the current state.

use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::calendar::{Bucket, Calendar, Period};
use crate::domain::{ActiveSession, Ledger, Task, TimeEntry};
use crate::entries::EntryFilter;
use crate::error::LedgerError;
use crate::sessions::{ClockOut, SessionStatus, Toggle};
use crate::storage::{LedgerStore, StorageError};
use crate::tasks::DeletedTask;

pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct State {
    ledger: Ledger,
    unsaved: bool,
}

pub struct Tracker<S, C = SystemClock> {
    state: RwLock<State>,
    store: S,
    clock: C,
}

impl<S: LedgerStore> Tracker<S, SystemClock> {
    pub fn open(store: S) -> Result<Self, StorageError> {
        Self::open_with_clock(store, SystemClock)
    }
}

impl<S: LedgerStore, C: TimeSource> Tracker<S, C> {
    pub fn open_with_clock(store: S, clock: C) -> Result<Self, StorageError> {
        let mut ledger = store.load()?;
        ledger.assign_missing_colors();
        debug!(
            tasks = ledger.tasks().len(),
            entries = ledger.entries().len(),
            sessions = ledger.active_sessions().len(),
            "opened ledger"
        );

        Ok(Self {
            state: RwLock::new(State {
                ledger,
                unsaved: false,
            }),
            store,
            clock,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn create_task(&self, name: &str) -> Result<Task, LedgerError> {
        self.mutate(|ledger, now| ledger.create_task(name, now))
    }

    pub fn delete_task(&self, task_id: &str) -> Option<DeletedTask> {
        let mut state = self.write();
        let deleted = state.ledger.delete_task(task_id, self.clock.now())?;
        self.persist(&mut state);
        Some(deleted)
    }

    pub fn set_task_color(&self, task_id: &str, color: &str) -> Result<(), LedgerError> {
        self.mutate(|ledger, _| ledger.set_task_color(task_id, color))
    }

    pub fn clock_in(&self, task_id: &str) -> Result<ActiveSession, LedgerError> {
        self.mutate(|ledger, now| ledger.clock_in(task_id, now))
    }

    pub fn clock_out(&self, task_id: Option<&str>) -> ClockOut {
        let mut state = self.write();
        let outcome = state.ledger.clock_out(task_id, self.clock.now());
        if outcome != ClockOut::NotTracking {
            self.persist(&mut state);
        }
        outcome
    }

    pub fn toggle(&self) -> Result<Toggle, LedgerError> {
        self.mutate(|ledger, now| ledger.toggle(now))
    }

    pub fn edit_entry(
        &self,
        entry_id: &str,
        task_id: &str,
        duration_minutes: f64,
    ) -> Result<TimeEntry, LedgerError> {
        self.mutate(|ledger, _| ledger.edit_entry(entry_id, task_id, duration_minutes))
    }

    pub fn delete_entry(&self, entry_id: &str) -> Option<TimeEntry> {
        let mut state = self.write();
        let removed = state.ledger.delete_entry(entry_id)?;
        self.persist(&mut state);
        Some(removed)
    }

    /// Runs `f` against the current ledger under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.read_guard().ledger)
    }

    pub fn snapshot(&self) -> Ledger {
        self.read(Ledger::clone)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read(|ledger| ledger.tasks().to_vec())
    }

    pub fn entries(&self) -> Vec<TimeEntry> {
        self.read(|ledger| ledger.entries().to_vec())
    }

    pub fn active_sessions(&self) -> Vec<ActiveSession> {
        self.read(|ledger| ledger.active_sessions().to_vec())
    }

    pub fn find_entries(&self, filter: &EntryFilter) -> Vec<TimeEntry> {
        self.read(|ledger| {
            ledger
                .find_entries(filter, &Local)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn live_total(&self, task_id: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.read(|ledger| ledger.live_total(task_id, now))
    }

    pub fn session_status(&self) -> Vec<SessionStatus> {
        let now = self.clock.now();
        self.read(|ledger| ledger.session_status(now))
    }

    pub fn bucket(&self, period: Period, date: NaiveDate) -> Bucket {
        self.read(|ledger| Calendar::local(ledger).bucket(period, date))
    }

    pub fn day_bucket(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Day, date)
    }

    pub fn week_bucket(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Week, date)
    }

    pub fn month_bucket(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Month, date)
    }

    pub fn year_bucket(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Year, date)
    }

    /// True when the last save failed and the store is behind memory.
    pub fn has_unsaved_changes(&self) -> bool {
        self.read_guard().unsaved
    }

    /// Saves the current ledger if an earlier save failed.
    pub fn flush(&self) -> Result<(), StorageError> {
        let mut state = self.write();
        if !state.unsaved {
            return Ok(());
        }
        self.store.save(&state.ledger)?;
        state.unsaved = false;
        debug!("flushed pending ledger changes");
        Ok(())
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Ledger, DateTime<Utc>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut state = self.write();
        let outcome = apply(&mut state.ledger, self.clock.now())?;
        self.persist(&mut state);
        Ok(outcome)
    }

    fn persist(&self, state: &mut State) {
        match self.store.save(&state.ledger) {
            Ok(()) => state.unsaved = false,
            Err(err) => {
                warn!(error = %err, "failed to save ledger, keeping changes in memory");
                state.unsaved = true;
            }
        }
    }

    // Mutations validate before touching the ledger, so a poisoned lock still
    // guards a consistent state.
    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use super::{ManualClock, Tracker};
    use crate::domain::Ledger;
    use crate::error::LedgerError;
    use crate::sessions::ClockOut;
    use crate::storage::MemoryStore;

    fn tracker() -> Tracker<MemoryStore, ManualClock> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        Tracker::open_with_clock(MemoryStore::new(), clock).expect("open")
    }

    #[test]
    fn writing_scenario() {
        let tracker = tracker();
        let task = tracker.create_task("Writing").expect("task");

        tracker.clock_in(&task.id).expect("clock in");
        tracker.clock.advance(Duration::minutes(90));
        let ClockOut::Recorded(entry) = tracker.clock_out(Some(&task.id)) else {
            panic!("expected an entry");
        };
        assert_eq!(entry.duration_ms, 5_400_000);
        assert_eq!(tracker.tasks()[0].total_time_ms, 5_400_000);

        let entry = tracker
            .edit_entry(&entry.id, &task.id, 30.0)
            .expect("edit should work");
        assert_eq!(entry.duration_ms, 1_800_000);
        assert_eq!(tracker.tasks()[0].total_time_ms, 1_800_000);

        tracker.delete_entry(&entry.id).expect("entry removed");
        assert_eq!(tracker.tasks()[0].total_time_ms, 0);
        assert!(tracker.entries().is_empty());
    }

    #[test]
    fn out_of_range_edit_is_rejected_and_not_saved() {
        let tracker = tracker();
        let task = tracker.create_task("Writing").expect("task");
        tracker.clock_in(&task.id).expect("clock in");
        tracker.clock.advance(Duration::minutes(90));
        let ClockOut::Recorded(entry) = tracker.clock_out(Some(&task.id)) else {
            panic!("expected an entry");
        };
        let saves = tracker.store().save_count();
        let before = tracker.snapshot();

        assert_eq!(
            tracker.edit_entry(&entry.id, &task.id, 1e12),
            Err(LedgerError::InvalidDuration(1e12))
        );
        assert_eq!(tracker.snapshot(), before);
        assert_eq!(tracker.store().save_count(), saves);

        let edited = tracker
            .edit_entry(&entry.id, &task.id, 30.0)
            .expect("edit should work");
        assert_eq!(edited.end_time - edited.start_time, Duration::minutes(30));
    }

    #[test]
    fn every_change_reaches_the_store() {
        let tracker = tracker();
        let task = tracker.create_task("Writing").expect("task");
        tracker.clock_in(&task.id).expect("clock in");
        assert_eq!(tracker.store().save_count(), 2);

        let saved = tracker.store().saved().expect("saved ledger");
        assert_eq!(saved.active_sessions().len(), 1);
        assert_eq!(saved, tracker.snapshot());
    }

    #[test]
    fn rejected_changes_are_not_saved() {
        let tracker = tracker();
        assert_eq!(tracker.create_task(" "), Err(LedgerError::EmptyTaskName));
        assert_eq!(tracker.clock_out(None), ClockOut::NotTracking);
        assert!(tracker.delete_entry("missing").is_none());
        assert_eq!(tracker.store().save_count(), 0);
    }

    #[test]
    fn failed_save_keeps_change_and_flush_retries() {
        let tracker = tracker();
        tracker.store().set_failing(true);

        let task = tracker.create_task("Writing").expect("task");
        assert!(tracker.has_unsaved_changes());
        assert_eq!(tracker.tasks().len(), 1);
        assert!(tracker.flush().is_err());

        tracker.store().set_failing(false);
        tracker.flush().expect("flush should succeed");
        assert!(!tracker.has_unsaved_changes());
        let saved = tracker.store().saved().expect("saved ledger");
        assert_eq!(saved.tasks()[0].id, task.id);
    }

    #[test]
    fn running_session_survives_reopen() {
        let tracker = tracker();
        let task = tracker.create_task("Writing").expect("task");
        tracker.clock_in(&task.id).expect("clock in");
        let saved = tracker.store().saved().expect("saved ledger");

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap());
        let reopened =
            Tracker::open_with_clock(MemoryStore::with_ledger(saved), clock).expect("open");

        assert_eq!(reopened.live_total(&task.id), Some(Duration::hours(2)));
        assert_eq!(reopened.session_status()[0].elapsed, Duration::hours(2));
    }

    #[test]
    fn concurrent_clocking_keeps_totals_consistent() {
        let tracker = Arc::new(tracker());
        let ids = (0..4)
            .map(|index| tracker.create_task(&format!("Task {index}")).expect("task").id)
            .collect::<Vec<_>>();

        let handles = ids
            .iter()
            .cloned()
            .map(|task_id| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..25 {
                        tracker.clock_in(&task_id).expect("clock in");
                        let _ = tracker.clock_in(&task_id);
                        tracker.clock.advance(Duration::seconds(1));
                        tracker.clock_out(Some(&task_id));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("worker should finish");
        }

        let ledger = tracker.snapshot();
        assert_eq!(ledger.entries().len(), 100);
        assert!(ledger.active_sessions().is_empty());
        assert_sum_invariant(&ledger);
    }

    fn assert_sum_invariant(ledger: &Ledger) {
        for task in ledger.tasks() {
            let sum = ledger
                .entries()
                .iter()
                .filter(|entry| entry.task_id == task.id)
                .map(|entry| entry.duration_ms)
                .sum::<u64>();
            assert_eq!(task.total_time_ms, sum, "task {}", task.name);
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create,
        Delete(usize),
        ClockIn(usize),
        ClockOut(Option<usize>),
        Edit(usize, usize, u16),
        DeleteEntry(usize),
        Advance(u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Create),
            (0..8_usize).prop_map(Op::Delete),
            (0..8_usize).prop_map(Op::ClockIn),
            proptest::option::of(0..8_usize).prop_map(Op::ClockOut),
            (0..16_usize, 0..8_usize, 0..600_u16).prop_map(|(e, t, m)| Op::Edit(e, t, m)),
            (0..16_usize).prop_map(Op::DeleteEntry),
            (0..600_u16).prop_map(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn totals_match_entries_after_any_sequence(ops in proptest::collection::vec(op(), 1..60)) {
            let tracker = tracker();
            for op in ops {
                let tasks = tracker.tasks();
                let entries = tracker.entries();
                let task_at = |index: usize| tasks.get(index % tasks.len().max(1)).map(|task| task.id.clone());
                let entry_at = |index: usize| entries.get(index % entries.len().max(1)).map(|entry| entry.id.clone());

                match op {
                    Op::Create => {
                        tracker.create_task("task").expect("task");
                    }
                    Op::Delete(index) => {
                        if let Some(id) = task_at(index) {
                            tracker.delete_task(&id);
                        }
                    }
                    Op::ClockIn(index) => {
                        if let Some(id) = task_at(index) {
                            let before = tracker.active_sessions().len();
                            let result = tracker.clock_in(&id);
                            let after = tracker.active_sessions().len();
                            prop_assert_eq!(after, if result.is_ok() { before + 1 } else { before });
                        }
                    }
                    Op::ClockOut(index) => {
                        let id = index.and_then(task_at);
                        tracker.clock_out(id.as_deref());
                    }
                    Op::Edit(entry, task, minutes) => {
                        if let (Some(entry_id), Some(task_id)) = (entry_at(entry), task_at(task)) {
                            tracker
                                .edit_entry(&entry_id, &task_id, f64::from(minutes) / 4.0)
                                .expect("edit");
                        }
                    }
                    Op::DeleteEntry(index) => {
                        if let Some(id) = entry_at(index) {
                            tracker.delete_entry(&id);
                        }
                    }
                    Op::Advance(seconds) => tracker.clock.advance(Duration::seconds(seconds.into())),
                }

                let ledger = tracker.snapshot();
                for task in ledger.tasks() {
                    let sum = ledger
                        .entries()
                        .iter()
                        .filter(|entry| entry.task_id == task.id)
                        .map(|entry| entry.duration_ms)
                        .sum::<u64>();
                    prop_assert_eq!(task.total_time_ms, sum);
                    let sessions = ledger
                        .active_sessions()
                        .iter()
                        .filter(|session| session.task_id == task.id)
                        .count();
                    prop_assert!(sessions <= 1);
                }
            }
        }
    }
}
