//! Log writers.
//!
//! # Responsibilities
//! - Append entries
//! - Remove entries older than a cutoff (expiry sweeps)
//! - List entries for the admin surface
//!
//! # Design Decisions
//! - Writers serialize access with a `Mutex`; appends are short
//! - The JSON-lines writer rewrites the whole file on prune

use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::audit::entry::{LogEntry, LogKind};

/// Errors from a log writer.
#[derive(Debug, Error)]
pub enum LogWriteError {
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("log writer lock poisoned")]
    Poisoned,
}

/// Destination for audit entries.
pub trait LogWriter: Send + Sync + std::fmt::Debug {
    fn append(&self, entry: &LogEntry) -> Result<(), LogWriteError>;

    /// Remove `kind` entries created before `older_than`. Returns how many were removed.
    fn prune(&self, kind: LogKind, older_than: DateTime<Utc>) -> Result<usize, LogWriteError>;

    /// Stored entries, oldest first, optionally restricted to one kind.
    fn entries(&self, kind: Option<LogKind>) -> Result<Vec<LogEntry>, LogWriteError>;
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryLogWriter {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogWriter for MemoryLogWriter {
    fn append(&self, entry: &LogEntry) -> Result<(), LogWriteError> {
        self.entries
            .lock()
            .map_err(|_| LogWriteError::Poisoned)?
            .push(entry.clone());
        Ok(())
    }

    fn prune(&self, kind: LogKind, older_than: DateTime<Utc>) -> Result<usize, LogWriteError> {
        let mut entries = self.entries.lock().map_err(|_| LogWriteError::Poisoned)?;
        let before = entries.len();
        entries.retain(|e| e.kind != kind || e.created >= older_than);
        Ok(before - entries.len())
    }

    fn entries(&self, kind: Option<LogKind>) -> Result<Vec<LogEntry>, LogWriteError> {
        let entries = self.entries.lock().map_err(|_| LogWriteError::Poisoned)?;
        Ok(entries
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesLogWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesLogWriter {
    /// Bind to `path`; the file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<LogEntry>, LogWriteError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = ?self.path, error = %e, "Skipping malformed log line"),
            }
        }
        Ok(entries)
    }
}

impl LogWriter for JsonLinesLogWriter {
    fn append(&self, entry: &LogEntry) -> Result<(), LogWriteError> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.lock.lock().map_err(|_| LogWriteError::Poisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn prune(&self, kind: LogKind, older_than: DateTime<Utc>) -> Result<usize, LogWriteError> {
        let _guard = self.lock.lock().map_err(|_| LogWriteError::Poisoned)?;
        let entries = self.read_all()?;
        let before = entries.len();
        let kept: Vec<LogEntry> = entries
            .into_iter()
            .filter(|e| e.kind != kind || e.created >= older_than)
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            let mut writer = BufWriter::new(File::create(&self.path)?);
            for entry in &kept {
                serde_json::to_writer(&mut writer, entry)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        Ok(removed)
    }

    fn entries(&self, kind: Option<LogKind>) -> Result<Vec<LogEntry>, LogWriteError> {
        let _guard = self.lock.lock().map_err(|_| LogWriteError::Poisoned)?;
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .collect())
    }
}
