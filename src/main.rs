mod ui;

use std::error::Error;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use punchclock::domain::millis_to_duration;
use punchclock::ledgers::{LOG_ENV, StateDir, ledger_from_env};
use punchclock::{
	Bucket, ClockOut, EntryFilter, FileStore, LedgerStore, Period, TimeSource, Toggle, Tracker,
	format_clock, format_duration,
};

use crate::ui::run_dashboard;

const TOP_TASKS: usize = 10;

#[derive(Debug, Parser)]
#[command(name = "punchclock", about = "Punch in and out of tasks and review where the time went")]
struct Cli {
	#[arg(long)]
	ledger: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Init,
	Dashboard,
	AddTask {
		name: String,
	},
	DeleteTask {
		#[arg(long)]
		task: String,
	},
	Color {
		#[arg(long)]
		task: String,
		color: String,
	},
	Start {
		#[arg(long)]
		task: String,
	},
	/// Stops the named task, or the oldest running one.
	Stop {
		#[arg(long)]
		task: Option<String>,
	},
	Toggle,
	Status,
	ListTasks,
	Entries {
		#[arg(long)]
		task: Option<String>,
		#[arg(long)]
		search: Option<String>,
		#[arg(long, default_value_t = 20)]
		limit: usize,
	},
	EditEntry {
		#[arg(long)]
		entry: String,
		#[arg(long)]
		task: String,
		#[arg(long)]
		minutes: f64,
	},
	DeleteEntry {
		#[arg(long)]
		entry: String,
	},
	Summary {
		#[arg(long, default_value_t = Period::Day)]
		period: Period,
		#[arg(long)]
		date: Option<String>,
	},
	Ledgers {
		#[arg(long, default_value_t = 20)]
		limit: usize,
	},
}

fn main() {
	init_logging();

	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn init_logging() {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let state_dir = StateDir::from_env();

	if let Some(Command::Ledgers { limit }) = &cli.command {
		print_recent_ledgers(&state_dir, *limit)?;
		return Ok(());
	}

	let (ledger_path, source) = state_dir.resolve_ledger(cli.ledger, ledger_from_env());
	debug!(path = %ledger_path.display(), %source, "resolved ledger");
	let tracker = Tracker::open(FileStore::new(&ledger_path))?;
	if let Err(err) = state_dir.remember_ledger(&ledger_path) {
		warn!(error = %err, "failed to store recent ledger");
	}

	match cli.command.unwrap_or(Command::Dashboard) {
		Command::Init => {
			tracker.store().save(&tracker.snapshot())?;
			println!("initialized ledger at {}", tracker.store().path().display());
		}
		Command::Dashboard => {
			run_dashboard(&tracker)?;
		}
		Command::AddTask { name } => {
			let task = tracker.create_task(&name)?;
			println!("created task {} ({})", task.id, task.name);
		}
		Command::DeleteTask { task } => match tracker.delete_task(&task) {
			Some(deleted) => {
				if let Some(entry) = deleted.final_entry {
					println!("stopped {} (+{})", deleted.task.name, format_duration(entry.duration()));
				}
				println!("deleted task {}", deleted.task.name);
			}
			None => println!("no task {task}"),
		},
		Command::Color { task, color } => {
			tracker.set_task_color(&task, &color)?;
			println!("set color of {task} to {color}");
		}
		Command::Start { task } => {
			tracker.clock_in(&task)?;
			println!("started {task}");
		}
		Command::Stop { task } => {
			print_clock_out(tracker.clock_out(task.as_deref()));
		}
		Command::Toggle => match tracker.toggle()? {
			Toggle::ClockedIn(session) => println!("started {}", session.task_id),
			Toggle::ClockedOut(outcome) => print_clock_out(outcome),
		},
		Command::Status => {
			print_status(&tracker);
		}
		Command::ListTasks => {
			print_tasks(&tracker);
		}
		Command::Entries { task, search, limit } => {
			let filter = EntryFilter {
				task_id: task,
				query: search,
			};
			print_entries(&tracker, &filter, limit);
		}
		Command::EditEntry {
			entry,
			task,
			minutes,
		} => {
			let entry = tracker.edit_entry(&entry, &task, minutes)?;
			println!(
				"entry {} is now {} on {}",
				entry.id,
				format_duration(entry.duration()),
				entry.task_name
			);
		}
		Command::DeleteEntry { entry } => match tracker.delete_entry(&entry) {
			Some(removed) => println!("deleted entry {} ({})", removed.id, removed.task_name),
			None => println!("no entry {entry}"),
		},
		Command::Summary { period, date } => {
			let date = parse_day(date.as_deref())?;
			print_summary(&tracker.bucket(period, date));
		}
		Command::Ledgers { .. } => {}
	}

	tracker.flush()?;
	Ok(())
}

fn print_recent_ledgers(state_dir: &StateDir, limit: usize) -> Result<(), Box<dyn Error>> {
	let rows = state_dir.recent_ledgers(limit)?;
	if rows.is_empty() {
		println!("no recent ledgers");
		return Ok(());
	}

	for (index, path) in rows.iter().enumerate() {
		println!("{:>2}. {}", index + 1, path.display());
	}

	Ok(())
}

fn parse_day(input: Option<&str>) -> Result<NaiveDate, Box<dyn Error>> {
	if let Some(raw) = input {
		Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?)
	} else {
		Ok(Local::now().date_naive())
	}
}

fn print_clock_out(outcome: ClockOut) {
	match outcome {
		ClockOut::Recorded(entry) => {
			println!("stopped {} (+{})", entry.task_name, format_duration(entry.duration()));
		}
		ClockOut::Dropped { task_id } => println!("discarded session of deleted task {task_id}"),
		ClockOut::NotTracking => println!("not clocked in"),
	}
}

fn print_status<S, C>(tracker: &Tracker<S, C>)
where
	S: LedgerStore,
	C: TimeSource,
{
	let sessions = tracker.session_status();
	if sessions.is_empty() {
		println!("not clocked in");
		return;
	}

	for session in sessions {
		println!("{} | {} | {}", format_clock(session.elapsed), session.task_id, session.task_name);
	}
}

fn print_tasks<S, C>(tracker: &Tracker<S, C>)
where
	S: LedgerStore,
	C: TimeSource,
{
	let now = tracker.now();
	tracker.read(|ledger| {
		if ledger.tasks().is_empty() {
			println!("no tasks yet");
			return;
		}

		for task in ledger.tasks() {
			let total = ledger.live_total(&task.id, now).unwrap_or_else(|| task.total_time());
			let marker = if ledger.is_tracking(&task.id) { "*" } else { " " };
			println!(
				"{marker} {} | {} | {} | {}",
				task.id,
				task.color,
				format_duration(total),
				task.name
			);
		}
	});
}

fn print_entries<S, C>(tracker: &Tracker<S, C>, filter: &EntryFilter, limit: usize)
where
	S: LedgerStore,
	C: TimeSource,
{
	let entries = tracker.find_entries(filter);
	if entries.is_empty() {
		println!("no time entries");
		return;
	}

	for entry in entries.iter().take(limit) {
		println!(
			"{} | {} | {} | {}",
			entry.id,
			entry.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
			format_duration(entry.duration()),
			entry.task_name
		);
	}
}

fn print_summary(bucket: &Bucket) {
	if bucket.first_day == bucket.last_day {
		println!("{} summary for {}", bucket.period, bucket.first_day.format("%Y-%m-%d"));
	} else {
		println!(
			"{} summary for {} to {}",
			bucket.period,
			bucket.first_day.format("%Y-%m-%d"),
			bucket.last_day.format("%Y-%m-%d")
		);
	}

	if bucket.entries.is_empty() {
		println!("no tracked sessions in this period");
		return;
	}

	println!("total {} across {} entries", format_duration(bucket.total()), bucket.entries.len());
	for row in bucket.top(TOP_TASKS) {
		let share = bucket
			.share_of(row)
			.map(|percent| format!("{percent:5.1}%"))
			.unwrap_or_else(|| "    -".to_string());
		println!("{} | {} | {}", format_duration(row.time()), share, row.name);
	}

	let untracked = bucket.untracked_ms();
	if untracked > 0 {
		println!(
			"{} | from deleted tasks",
			format_duration(millis_to_duration(untracked))
		);
	}
}
