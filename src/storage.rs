use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;

use crate::domain::{Ledger, LedgerHeader};

const ENTRIES_MARKER: &str = "\n=== ENTRIES ===\n";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML header: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to encode TOML header: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("failed to parse JSONL entry on line {line}: {source}")]
    JsonDecode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode JSONL entry: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
}

/// Loads and saves the whole ledger. Implementations must be safe to call
/// from whichever thread performed the mutation.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<Ledger, StorageError>;
    fn save(&self, ledger: &Ledger) -> Result<(), StorageError>;
}

/// A ledger file: TOML header with tasks and running sessions, followed by
/// one JSON entry per line.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for FileStore {
    fn load(&self) -> Result<Ledger, StorageError> {
        load_ledger(&self.path)
    }

    fn save(&self, ledger: &Ledger) -> Result<(), StorageError> {
        save_ledger(&self.path, ledger)
    }
}

/// Keeps the last saved ledger in memory. Saves can be made to fail to
/// exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Ledger>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            saved: Mutex::new(Some(ledger)),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Option<Ledger> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Ledger, StorageError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, ledger: &Ledger) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("saves are disabled".to_string()));
        }
        *self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ledger.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn load_ledger(path: &Path) -> Result<Ledger, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Ledger::new()),
        Err(err) => return Err(StorageError::Io(err)),
    };

    if raw.trim().is_empty() {
        return Ok(Ledger::new());
    }

    let (header_blob, entries_blob) = raw
        .split_once(ENTRIES_MARKER)
        .unwrap_or((raw.as_str(), ""));

    let header: LedgerHeader = toml::from_str(header_blob)?;
    let mut entries = Vec::new();
    for (index, line) in entries_blob.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|source| StorageError::JsonDecode {
            line: index + 1,
            source,
        })?;
        entries.push(entry);
    }

    Ok(Ledger::from_parts(header, entries))
}

/// Writes next to the target and renames over it, so a failed write leaves
/// the previous file in place.
pub fn save_ledger(path: &Path, ledger: &Ledger) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut buffer = toml::to_string_pretty(&ledger.header)?;
    buffer.push_str(ENTRIES_MARKER);
    for entry in &ledger.entries {
        let line = serde_json::to_string(entry).map_err(StorageError::JsonEncode)?;
        buffer.push_str(&line);
        buffer.push('\n');
    }

    let staging = path.with_extension("ledger.tmp");
    let mut file = fs::File::create(&staging)?;
    file.write_all(buffer.as_bytes())?;
    file.sync_all()?;
    fs::rename(&staging, path)?;

    Ok(())
}
