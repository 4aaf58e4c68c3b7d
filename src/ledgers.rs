//! Where ledgers live.
//!
//! The ledger to open is picked from, in order: an explicit path, the
//! `PUNCHCLOCK_LEDGER` variable, the most recently used ledger, and finally
//! `punchclock.ledger` in the state directory. Recently used ledgers are kept
//! one per line in the state directory.

use std::env;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const LEDGER_ENV: &str = "PUNCHCLOCK_LEDGER";
pub const STATE_DIR_ENV: &str = "PUNCHCLOCK_STATE_DIR";
pub const LOG_ENV: &str = "PUNCHCLOCK_LOG";

const APP_DIR: &str = "punchclock";
const DEFAULT_LEDGER_FILE: &str = "punchclock.ledger";
const RECENT_LEDGERS_FILE: &str = "recent_ledgers.txt";
const MAX_RECENT_LEDGERS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSource {
	Flag,
	Environment,
	Recent,
	Default,
}

impl Display for LedgerSource {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let label = match self {
			LedgerSource::Flag => "--ledger",
			LedgerSource::Environment => LEDGER_ENV,
			LedgerSource::Recent => "recent ledgers",
			LedgerSource::Default => "default location",
		};
		f.write_str(label)
	}
}

#[derive(Debug, Clone)]
pub struct StateDir {
	root: PathBuf,
}

impl StateDir {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// `PUNCHCLOCK_STATE_DIR`, else the platform state directory.
	pub fn from_env() -> Self {
		if let Some(path) = env::var_os(STATE_DIR_ENV) {
			return Self::new(path);
		}

		#[cfg(target_os = "windows")]
		{
			if let Some(path) = env::var_os("LOCALAPPDATA") {
				return Self::new(PathBuf::from(path).join(APP_DIR));
			}
		}

		if let Some(path) = env::var_os("XDG_STATE_HOME") {
			return Self::new(PathBuf::from(path).join(APP_DIR));
		}

		if let Some(path) = env::var_os("HOME") {
			return Self::new(PathBuf::from(path).join(".local").join("state").join(APP_DIR));
		}

		Self::new(format!(".{APP_DIR}"))
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn default_ledger(&self) -> PathBuf {
		self.root.join(DEFAULT_LEDGER_FILE)
	}

	pub fn resolve_ledger(
		&self,
		flag: Option<PathBuf>,
		env_value: Option<PathBuf>,
	) -> (PathBuf, LedgerSource) {
		if let Some(path) = flag {
			return (absolutize(path), LedgerSource::Flag);
		}

		if let Some(path) = env_value.filter(|path| !path.as_os_str().is_empty()) {
			return (absolutize(path), LedgerSource::Environment);
		}

		if let Ok(recent) = self.recent_ledgers(1) {
			if let Some(path) = recent.into_iter().next() {
				return (path, LedgerSource::Recent);
			}
		}

		(absolutize(self.default_ledger()), LedgerSource::Default)
	}

	pub fn remember_ledger(&self, path: &Path) -> Result<(), std::io::Error> {
		let path = absolutize(path.to_path_buf());
		let mut entries = self.recent_ledgers(MAX_RECENT_LEDGERS)?;
		entries.retain(|entry| entry != &path);
		entries.insert(0, path);
		entries.truncate(MAX_RECENT_LEDGERS);
		self.save_recent_ledgers(&entries)
	}

	pub fn recent_ledgers(&self, limit: usize) -> Result<Vec<PathBuf>, std::io::Error> {
		let raw = match fs::read_to_string(self.recent_ledgers_path()) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err),
		};

		Ok(raw
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.take(limit)
			.map(PathBuf::from)
			.collect())
	}

	fn save_recent_ledgers(&self, entries: &[PathBuf]) -> Result<(), std::io::Error> {
		fs::create_dir_all(&self.root)?;

		let mut file = fs::File::create(self.recent_ledgers_path())?;
		for path in entries {
			writeln!(file, "{}", path.display())?;
		}

		Ok(())
	}

	fn recent_ledgers_path(&self) -> PathBuf {
		self.root.join(RECENT_LEDGERS_FILE)
	}
}

/// Ledger path from `PUNCHCLOCK_LEDGER`, if set.
pub fn ledger_from_env() -> Option<PathBuf> {
	env::var_os(LEDGER_ENV).map(PathBuf::from)
}

fn absolutize(path: PathBuf) -> PathBuf {
	let path = if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	};

	if path.exists() {
		fs::canonicalize(&path).unwrap_or(path)
	} else {
		path
	}
}

#[cfg(test)]
mod tests {
	use std::fs;
	use std::path::PathBuf;

	use super::{LedgerSource, StateDir};

	fn temp_state_dir(name: &str) -> StateDir {
		let mut path = std::env::temp_dir();
		path.push(format!("{}_{}", name, std::process::id()));
		let _ = fs::remove_dir_all(&path);
		StateDir::new(path)
	}

	#[test]
	fn resolves_in_priority_order() {
		let state = temp_state_dir("punchclock_resolve");
		let flag = state.root().join("flag.ledger");
		let from_env = state.root().join("env.ledger");

		let (path, source) = state.resolve_ledger(Some(flag.clone()), Some(from_env.clone()));
		assert_eq!((path, source), (flag, LedgerSource::Flag));

		let (path, source) = state.resolve_ledger(None, Some(from_env.clone()));
		assert_eq!((path, source), (from_env, LedgerSource::Environment));

		let (path, source) = state.resolve_ledger(None, Some(PathBuf::new()));
		assert_eq!((path, source), (state.default_ledger(), LedgerSource::Default));

		let recent = state.root().join("recent.ledger");
		state.remember_ledger(&recent).expect("remember");
		let (path, source) = state.resolve_ledger(None, None);
		assert_eq!((path, source), (recent, LedgerSource::Recent));

		let _ = fs::remove_dir_all(state.root());
	}

	#[test]
	fn recent_ledgers_are_most_recent_first_without_duplicates() {
		let state = temp_state_dir("punchclock_recent");
		let first = state.root().join("first.ledger");
		let second = state.root().join("second.ledger");

		state.remember_ledger(&first).expect("remember");
		state.remember_ledger(&second).expect("remember");
		state.remember_ledger(&first).expect("remember");

		let recent = state.recent_ledgers(10).expect("recent");
		assert_eq!(recent, vec![first.clone(), second]);
		assert_eq!(state.recent_ledgers(1).expect("recent"), vec![first]);

		let _ = fs::remove_dir_all(state.root());
	}
}
