//! Day, week, month and year summaries over the entry history.
//!
//! Nothing here is cached. Every call walks the entries once and builds the
//! bucket from scratch, so a [`Calendar`] always reflects the ledger it borrows.
//!
//! An entry belongs to the day on which it starts, in the calendar's time zone.
//! Entries whose task has been deleted still count towards a bucket's entries
//! and total, but they are left out of the per-task breakdown.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, TimeZone};
use thiserror::Error;

use crate::domain::{Ledger, TimeEntry, millis_to_duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Day,
    /// Sunday to Saturday.
    Week,
    Month,
    Year,
}

impl Period {
    /// First and last day (inclusive) of the period containing `date`.
    pub fn bounds(self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Day => (date, date),
            Period::Week => {
                let first = start_of_week(date);
                (first, first + Duration::days(6))
            }
            Period::Month => {
                let first = first_day_of_month(date);
                let length = days_in_month(date.year(), date.month());
                (first, first + Duration::days(i64::from(length) - 1))
            }
            Period::Year => (
                NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("January 1st must be valid"),
                NaiveDate::from_ymd_opt(date.year(), 12, 31).expect("December 31st must be valid"),
            ),
        }
    }

    /// The smaller period a bucket of this kind is split into for display.
    pub fn child(self) -> Option<Period> {
        match self {
            Period::Day => None,
            Period::Week | Period::Month => Some(Period::Day),
            Period::Year => Some(Period::Month),
        }
    }

    /// Moves `date` by `delta` periods.
    pub fn shift(self, date: NaiveDate, delta: i32) -> NaiveDate {
        match self {
            Period::Day => date + Duration::days(delta.into()),
            Period::Week => date + Duration::weeks(delta.into()),
            Period::Month => shift_month(date, delta),
            Period::Year => shift_month(date, delta.saturating_mul(12)),
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown period `{0}`, expected day, week, month or year")]
pub struct ParsePeriodError(String);

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Period::Day),
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            "year" | "yearly" => Ok(Period::Year),
            _ => Err(ParsePeriodError(raw.to_string())),
        }
    }
}

/// Time spent on one task within a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTime {
    pub task_id: String,
    pub name: String,
    pub color: String,
    pub time_ms: u64,
}

impl TaskTime {
    pub fn time(&self) -> Duration {
        millis_to_duration(self.time_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub period: Period,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    /// Entries starting inside the bucket, in recording order.
    pub entries: Vec<TimeEntry>,
    pub total_ms: u64,
    /// Per-task time in task list order.
    pub breakdown: Vec<TaskTime>,
}

impl Bucket {
    pub fn total(&self) -> Duration {
        millis_to_duration(self.total_ms)
    }

    pub fn time_for(&self, task_id: &str) -> u64 {
        self.breakdown
            .iter()
            .find(|row| row.task_id == task_id)
            .map(|row| row.time_ms)
            .unwrap_or(0)
    }

    /// Share of the bucket total in percent, `None` for an empty bucket or a
    /// task absent from the breakdown.
    pub fn percentage(&self, task_id: &str) -> Option<f64> {
        let row = self.breakdown.iter().find(|row| row.task_id == task_id)?;
        self.share_of(row)
    }

    pub fn share_of(&self, row: &TaskTime) -> Option<f64> {
        if self.total_ms == 0 {
            return None;
        }
        Some(row.time_ms as f64 / self.total_ms as f64 * 100.0)
    }

    /// Breakdown by descending time. Equal times keep task list order.
    pub fn ranked(&self) -> Vec<&TaskTime> {
        let mut rows = self.breakdown.iter().collect::<Vec<_>>();
        rows.sort_by(|left, right| right.time_ms.cmp(&left.time_ms));
        rows
    }

    pub fn top(&self, limit: usize) -> Vec<&TaskTime> {
        let mut rows = self.ranked();
        rows.truncate(limit);
        rows
    }

    /// Time from entries whose task no longer exists.
    pub fn untracked_ms(&self) -> u64 {
        let tracked = self.breakdown.iter().map(|row| row.time_ms).sum::<u64>();
        self.total_ms.saturating_sub(tracked)
    }
}

pub struct Calendar<'a, Tz: TimeZone> {
    ledger: &'a Ledger,
    tz: Tz,
}

impl<'a> Calendar<'a, Local> {
    pub fn local(ledger: &'a Ledger) -> Self {
        Self::new(ledger, Local)
    }
}

impl<'a, Tz: TimeZone> Calendar<'a, Tz> {
    pub fn new(ledger: &'a Ledger, tz: Tz) -> Self {
        Self { ledger, tz }
    }

    pub fn day(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Day, date)
    }

    pub fn week(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Week, date)
    }

    pub fn month(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Month, date)
    }

    pub fn year(&self, date: NaiveDate) -> Bucket {
        self.bucket(Period::Year, date)
    }

    pub fn bucket(&self, period: Period, date: NaiveDate) -> Bucket {
        let (first_day, last_day) = period.bounds(date);
        let tasks = self.ledger.tasks();
        let positions = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (task.id.as_str(), index))
            .collect::<HashMap<_, _>>();

        let mut entries = Vec::new();
        let mut total_ms = 0_u64;
        let mut per_task: Vec<Option<u64>> = vec![None; tasks.len()];

        for entry in self.ledger.entries() {
            let day = entry.start_time.with_timezone(&self.tz).date_naive();
            if day < first_day || day > last_day {
                continue;
            }

            total_ms = total_ms.saturating_add(entry.duration_ms);
            if let Some(&index) = positions.get(entry.task_id.as_str()) {
                let slot = per_task[index].get_or_insert(0);
                *slot = slot.saturating_add(entry.duration_ms);
            }
            entries.push(entry.clone());
        }

        let breakdown = tasks
            .iter()
            .zip(per_task)
            .filter_map(|(task, time_ms)| {
                let time_ms = time_ms?;
                Some(TaskTime {
                    task_id: task.id.clone(),
                    name: task.name.clone(),
                    color: task.color.clone(),
                    time_ms,
                })
            })
            .collect();

        Bucket {
            period,
            first_day,
            last_day,
            entries,
            total_ms,
            breakdown,
        }
    }

    /// Buckets one level down: the days of a week or month, the months of a
    /// year. A day has no children.
    pub fn children(&self, period: Period, date: NaiveDate) -> Vec<Bucket> {
        let Some(child) = period.child() else {
            return Vec::new();
        };
        let (first_day, last_day) = period.bounds(date);

        let mut buckets = Vec::new();
        let mut cursor = first_day;
        while cursor <= last_day {
            let bucket = self.bucket(child, cursor);
            let Some(next) = bucket.last_day.succ_opt() else {
                buckets.push(bucket);
                break;
            };
            buckets.push(bucket);
            cursor = next;
        }
        buckets
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).expect("next year date should be valid")
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).expect("next month date should be valid")
    };
    (first_of_next - Duration::days(1)).day()
}

fn first_day_of_month(day: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(day.year(), day.month(), 1).expect("first day of month must be valid")
}

fn start_of_week(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_sunday().into())
}

fn shift_month(day: NaiveDate, delta: i32) -> NaiveDate {
    let months = day.year() * 12 + day.month0() as i32 + delta;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    let target_day = day.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, target_day).expect("shifted month date must be valid")
}
