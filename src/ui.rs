use std::error::Error;
use std::io;
use std::time::Duration as StdDuration;

use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use crossterm::{ExecutableCommand, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};

use punchclock::{
	Bucket, ClockOut, LedgerStore, Period, SessionStatus, TimeSource, Toggle, Tracker, format_clock,
	format_duration,
};

// The dashboard only reads between key presses; a late or skipped tick just
// delays the next redraw.
const TICK: StdDuration = StdDuration::from_secs(1);
const BAR_WIDTH: usize = 20;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);

pub fn run_dashboard<S, C>(tracker: &Tracker<S, C>) -> Result<(), Box<dyn Error>>
where
	S: LedgerStore,
	C: TimeSource,
{
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, tracker);

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop<S, C>(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	tracker: &Tracker<S, C>,
) -> Result<(), Box<dyn Error>>
where
	S: LedgerStore,
	C: TimeSource,
{
	let mut app = App::new(tracker.now().with_timezone(&Local).date_naive());

	loop {
		let view = build_view(&app, tracker);
		app.clamp_selection(&view);
		terminal.draw(|frame| draw_dashboard(frame, &app, &view))?;

		if event::poll(TICK)? {
			if let CEvent::Key(key) = event::read()? {
				if key.kind != KeyEventKind::Press {
					continue;
				}

				let should_quit = match app.mode {
					InputMode::Prompt(_) => {
						handle_prompt_key(&mut app, key.code, tracker);
						false
					}
					InputMode::Normal => handle_normal_key(&mut app, key.code, tracker, &view),
				};

				if should_quit {
					break;
				}
			}
		}
	}

	Ok(())
}

struct App {
	mode: InputMode,
	period: Period,
	date: NaiveDate,
	task_index: usize,
	status: String,
}

enum InputMode {
	Normal,
	Prompt(String),
}

impl App {
	fn new(today: NaiveDate) -> Self {
		Self {
			mode: InputMode::Normal,
			period: Period::Day,
			date: today,
			task_index: 0,
			status: "ready".to_string(),
		}
	}

	fn clamp_selection(&mut self, view: &ViewModel) {
		self.task_index = self.task_index.min(view.tasks.len().saturating_sub(1));
	}

	fn selected_task_id<'v>(&self, view: &'v ViewModel) -> Option<&'v str> {
		view.tasks.get(self.task_index).map(|row| row.id.as_str())
	}
}

struct TaskRow {
	id: String,
	name: String,
	color: String,
	live_total: chrono::Duration,
	tracking: bool,
}

struct ViewModel {
	sessions: Vec<SessionStatus>,
	tasks: Vec<TaskRow>,
	bucket: Bucket,
}

fn build_view<S, C>(app: &App, tracker: &Tracker<S, C>) -> ViewModel
where
	S: LedgerStore,
	C: TimeSource,
{
	let now = tracker.now();
	let tasks = tracker.read(|ledger| {
		ledger
			.tasks()
			.iter()
			.map(|task| TaskRow {
				id: task.id.clone(),
				name: task.name.clone(),
				color: task.color.clone(),
				live_total: ledger.live_total(&task.id, now).unwrap_or_else(|| task.total_time()),
				tracking: ledger.is_tracking(&task.id),
			})
			.collect()
	});

	ViewModel {
		sessions: tracker.session_status(),
		tasks,
		bucket: tracker.bucket(app.period, app.date),
	}
}

fn handle_normal_key<S, C>(app: &mut App, code: KeyCode, tracker: &Tracker<S, C>, view: &ViewModel) -> bool
where
	S: LedgerStore,
	C: TimeSource,
{
	match code {
		KeyCode::Char('q') | KeyCode::Esc => return true,
		KeyCode::Char('d') => app.period = Period::Day,
		KeyCode::Char('w') => app.period = Period::Week,
		KeyCode::Char('m') => app.period = Period::Month,
		KeyCode::Char('y') => app.period = Period::Year,
		KeyCode::Left | KeyCode::Char('h') => app.date = app.period.shift(app.date, -1),
		KeyCode::Right | KeyCode::Char('l') => app.date = app.period.shift(app.date, 1),
		KeyCode::Char('.') => app.date = tracker.now().with_timezone(&Local).date_naive(),
		KeyCode::Up | KeyCode::Char('k') => app.task_index = app.task_index.saturating_sub(1),
		KeyCode::Down | KeyCode::Char('j') => app.task_index += 1,
		KeyCode::Char('n') => app.mode = InputMode::Prompt(String::new()),
		KeyCode::Enter => {
			if let Some(task_id) = app.selected_task_id(view) {
				app.status = start_or_stop(tracker, task_id);
			}
		}
		KeyCode::Char(' ') => {
			app.status = match tracker.toggle() {
				Ok(Toggle::ClockedIn(session)) => format!("started {}", task_name(view, &session.task_id)),
				Ok(Toggle::ClockedOut(outcome)) => describe_clock_out(outcome),
				Err(err) => err.to_string(),
			};
		}
		_ => {}
	}

	false
}

fn handle_prompt_key<S, C>(app: &mut App, code: KeyCode, tracker: &Tracker<S, C>)
where
	S: LedgerStore,
	C: TimeSource,
{
	let InputMode::Prompt(input) = &mut app.mode else {
		return;
	};

	match code {
		KeyCode::Esc => app.mode = InputMode::Normal,
		KeyCode::Backspace => {
			input.pop();
		}
		KeyCode::Char(ch) => input.push(ch),
		KeyCode::Enter => {
			app.status = match tracker.create_task(input) {
				Ok(task) => format!("created {}", task.name),
				Err(err) => err.to_string(),
			};
			app.mode = InputMode::Normal;
		}
		_ => {}
	}
}

fn start_or_stop<S, C>(tracker: &Tracker<S, C>, task_id: &str) -> String
where
	S: LedgerStore,
	C: TimeSource,
{
	if tracker.read(|ledger| ledger.is_tracking(task_id)) {
		return describe_clock_out(tracker.clock_out(Some(task_id)));
	}

	match tracker.clock_in(task_id) {
		Ok(_) => "clocked in".to_string(),
		Err(err) => err.to_string(),
	}
}

fn describe_clock_out(outcome: ClockOut) -> String {
	match outcome {
		ClockOut::Recorded(entry) => format!("stopped {} (+{})", entry.task_name, format_duration(entry.duration())),
		ClockOut::Dropped { task_id } => format!("discarded session of deleted task {task_id}"),
		ClockOut::NotTracking => "not clocked in".to_string(),
	}
}

fn task_name<'v>(view: &'v ViewModel, task_id: &str) -> &'v str {
	view.tasks
		.iter()
		.find(|row| row.id == task_id)
		.map(|row| row.name.as_str())
		.unwrap_or("task")
}

fn draw_dashboard(frame: &mut Frame, app: &App, view: &ViewModel) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(4)])
		.split(frame.area());

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
		.split(layout[1]);

	render_sessions_panel(frame, layout[0], view);
	render_tasks_panel(frame, body[0], app, view);
	render_breakdown_panel(frame, body[1], view);
	render_footer(frame, layout[2], app);
}

fn render_sessions_panel(frame: &mut Frame, area: Rect, view: &ViewModel) {
	let line = if view.sessions.is_empty() {
		Line::from("Not clocked in")
	} else {
		let mut spans = Vec::new();
		for (index, session) in view.sessions.iter().enumerate() {
			if index > 0 {
				spans.push(Span::raw(" | "));
			}
			spans.push(Span::styled(session.task_name.clone(), task_style(&session.task_color)));
			spans.push(Span::raw(format!(": {}", format_clock(session.elapsed))));
		}
		Line::from(spans)
	};

	let panel = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Running"));
	frame.render_widget(panel, area);
}

fn render_tasks_panel(frame: &mut Frame, area: Rect, app: &App, view: &ViewModel) {
	let items = view
		.tasks
		.iter()
		.map(|row| {
			let marker = if row.tracking { "● " } else { "  " };
			ListItem::new(Line::from(vec![
				Span::raw(marker),
				Span::styled(row.name.clone(), task_style(&row.color)),
				Span::raw(format!("  {}", format_duration(row.live_total))),
			]))
		})
		.collect::<Vec<_>>();

	let mut state = ListState::default();
	if !items.is_empty() {
		state.select(Some(app.task_index));
	}

	let list = List::new(if items.is_empty() {
		vec![ListItem::new("(no tasks, press n to add one)")]
	} else {
		items
	})
	.block(Block::default().borders(Borders::ALL).title("Tasks"))
	.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(list, area, &mut state);
}

fn render_breakdown_panel(frame: &mut Frame, area: Rect, view: &ViewModel) {
	let bucket = &view.bucket;
	let mut lines = vec![
		Line::from(format!(
			"Total: {} in {} entries",
			format_duration(bucket.total()),
			bucket.entries.len()
		)),
		Line::from(""),
	];

	let ranked = bucket.ranked();
	if ranked.is_empty() {
		lines.push(Line::from("(nothing tracked)"));
	}
	for row in ranked {
		let percent = bucket.share_of(row).unwrap_or(0.0);
		let width = bar_width(percent);
		lines.push(Line::from(vec![
			Span::styled("█".repeat(width), task_style(&row.color)),
			Span::raw(format!(
				"{} {:>5.1}% {:>8} {}",
				" ".repeat(BAR_WIDTH - width),
				percent,
				format_duration(row.time()),
				row.name
			)),
		]));
	}

	let title = if bucket.first_day == bucket.last_day {
		format!("{} | {}", bucket.period, bucket.first_day.format("%A, %d %B %Y"))
	} else {
		format!(
			"{} | {} - {}",
			bucket.period,
			bucket.first_day.format("%d %b %Y"),
			bucket.last_day.format("%d %b %Y")
		)
	};
	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
	frame.render_widget(panel, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
	let footer_lines = match &app.mode {
		InputMode::Normal => vec![
			Line::from(
				"j/k select | Enter start/stop | space quick toggle | n new task | d/w/m/y period | h/l shift | . today | q quit",
			),
			Line::from(app.status.clone()),
		],
		InputMode::Prompt(input) => vec![
			Line::from(format!("New task > {input}")),
			Line::from("Enter submit | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines).block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn task_style(color: &str) -> Style {
	color_from_hex(color)
		.map(|color| Style::default().fg(color))
		.unwrap_or_default()
}

/// Filled cells for a share, at least one so every ranked task shows.
fn bar_width(percent: f64) -> usize {
	(((percent / 100.0) * BAR_WIDTH as f64).round() as usize).clamp(1, BAR_WIDTH)
}

fn color_from_hex(raw: &str) -> Option<Color> {
	let hex = raw.trim().strip_prefix('#')?;
	if hex.len() != 6 {
		return None;
	}
	let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
	Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[cfg(test)]
mod tests {
	use ratatui::style::Color;

	use super::{BAR_WIDTH, bar_width, color_from_hex};

	#[test]
	fn parses_palette_colors() {
		assert_eq!(color_from_hex("#7c3aed"), Some(Color::Rgb(0x7c, 0x3a, 0xed)));
		assert_eq!(color_from_hex("violet"), None);
		assert_eq!(color_from_hex("#12345"), None);
	}

	#[test]
	fn bars_keep_rows_aligned() {
		assert_eq!(bar_width(0.0), 1);
		assert_eq!(bar_width(50.0), BAR_WIDTH / 2);
		assert_eq!(bar_width(100.0), BAR_WIDTH);
		assert_eq!(bar_width(140.0), BAR_WIDTH);
	}
}
