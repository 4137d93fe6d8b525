//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! tailing process never sees a partial record. When the primary file cannot
//! be written the writer degrades to the fallback file, then stderr, then
//! silently discards. Logging must never take a session down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::LoggingConfig;
use crate::core::errors::{Result, TileError};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RowSkipped,
    TextTruncated,
    UrlRejected,
    ColorCoerced,
    FieldsDropped,
    BudgetTrimmed,
    SessionOpened,
    SessionEmpty,
    DecodeFailed,
    Unauthorized,
    RefreshSucceeded,
    RefreshFailed,
    SessionExpired,
    DeliveryFailed,
    LogBackpressure,
}

/// A single JSONL record. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Session identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
    /// One-based source row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// Column or field the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Actor whose interaction triggered the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Human-readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            session: None,
            row: None,
            field: None,
            actor: None,
            ok: None,
            details: None,
        }
    }
}

/// Where the writer is currently sending lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

/// Settings for [`JsonlWriter`].
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept next to the live file.
    pub max_rotated_files: u32,
}

impl From<&LoggingConfig> for JsonlConfig {
    fn from(cfg: &LoggingConfig) -> Self {
        Self {
            path: cfg.jsonl_path.clone(),
            fallback_path: cfg.fallback_path.clone(),
            max_size_bytes: cfg.max_size_bytes,
            max_rotated_files: cfg.max_rotated_files,
        }
    }
}

/// Append-only JSONL writer with rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    target: Target,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log. Falls down the degradation chain on failure; never errors.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            target: Target::Discard,
            bytes_written: 0,
        };
        w.open_primary();
        w
    }

    /// Write one entry as one line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[STL-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &'static str {
        match self.target {
            Target::Primary => "primary",
            Target::Fallback => "fallback",
            Target::Stderr => "stderr",
            Target::Discard => "discard",
        }
    }

    /// Bytes in the current file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_line(&mut self, line: &str) {
        if matches!(self.target, Target::Primary | Target::Fallback)
            && self.bytes_written + line.len() as u64 > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.target {
            Target::Primary | Target::Fallback => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            Target::Stderr => {
                let _ = write!(io::stderr(), "[STL-JSONL] {line}");
            }
            Target::Discard => {}
        }
    }

    fn open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => self.attach(file, size, Target::Primary),
            Err(_) => self.open_fallback(),
        }
    }

    fn open_fallback(&mut self) {
        let Some(fallback) = self.config.fallback_path.clone() else {
            self.target = Target::Stderr;
            let _ = writeln!(
                io::stderr(),
                "[STL-JSONL] primary path failed and no fallback configured, using stderr"
            );
            return;
        };
        match open_append(&fallback) {
            Ok((file, size)) => {
                let _ = writeln!(
                    io::stderr(),
                    "[STL-JSONL] primary path failed, using fallback: {}",
                    fallback.display()
                );
                self.attach(file, size, Target::Fallback);
            }
            Err(_) => {
                self.target = Target::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[STL-JSONL] primary and fallback paths failed, using stderr"
                );
            }
        }
    }

    fn attach(&mut self, file: File, size: u64, target: Target) {
        self.writer = Some(BufWriter::with_capacity(16 * 1024, file));
        self.target = target;
        self.bytes_written = size;
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.target {
            Target::Primary => self.open_fallback(),
            Target::Fallback => self.target = Target::Stderr,
            Target::Stderr | Target::Discard => self.target = Target::Discard,
        }
    }

    fn rotate(&mut self) {
        self.flush();
        self.writer = None;

        let base = match self.target {
            Target::Primary => self.config.path.clone(),
            Target::Fallback => match &self.config.fallback_path {
                Some(p) => p.clone(),
                None => return,
            },
            Target::Stderr | Target::Discard => return,
        };

        // live → .1 → .2 → … ; the oldest generation falls off the end.
        let keep = self.config.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for i in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        if keep > 0 {
            let _ = fs::rename(&base, rotated_name(&base, 1));
        } else {
            let _ = fs::remove_file(&base);
        }

        let target = self.target;
        match open_append(&base) {
            Ok((file, _)) => self.attach(file, 0, target),
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Open or create a file for appending. Returns `(file, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| TileError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TileError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
