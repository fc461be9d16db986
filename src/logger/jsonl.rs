//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees a partial line.
//!
//! If the file cannot be opened or written, lines go to stderr with a
//! `[SWP-JSONL]` prefix instead.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SweepError};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types of the sweep activity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    ScanFailure,
    ResourceClassified,
    RemovalRequested,
    RemovalFailed,
    StateChange,
    SweepComplete,
    RunFinish,
    Error,
}

/// A single JSONL log entry. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Lifecycle transition, e.g. `pending->waiting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Filter decision or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
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
            account: None,
            resource_type: None,
            region: None,
            identifier: None,
            state: None,
            reason: None,
            sweep: None,
            attempts: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines currently go. Only ever moves down: file, stderr, discard.
enum Sink {
    File(BufWriter<File>),
    Stderr,
    Discard,
}

/// Append-only JSONL writer. A sweep never aborts because logging failed:
/// an unusable file degrades to stderr, and a broken stderr to discard.
pub struct JsonlWriter {
    path: PathBuf,
    sink: Sink,
    lines_written: u64,
}

impl JsonlWriter {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sink = match open_append(&path) {
            Ok(file) => Sink::File(BufWriter::with_capacity(64 * 1024, file)),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SWP-JSONL] {e}; activity goes to stderr");
                Sink::Stderr
            }
        };
        Self {
            path,
            sink,
            lines_written: 0,
        }
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SWP-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Sink::File(w) = &mut self.sink {
            let _ = w.flush();
        }
    }

    /// Flush buffered lines and sync the file to disk.
    pub fn close(&mut self) {
        if let Sink::File(w) = &mut self.sink {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
    }

    /// `file`, `stderr` or `discard`.
    pub fn sink_name(&self) -> &'static str {
        match self.sink {
            Sink::File(_) => "file",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn write_line(&mut self, line: &str) {
        let written = match &mut self.sink {
            Sink::File(w) => w.write_all(line.as_bytes()).is_ok(),
            Sink::Stderr => write!(io::stderr(), "[SWP-JSONL] {line}").is_ok(),
            Sink::Discard => return,
        };
        if written {
            self.lines_written += 1;
        } else {
            self.degrade();
            self.write_line(line);
        }
    }

    fn degrade(&mut self) {
        self.sink = match self.sink {
            Sink::File(_) => {
                let _ = writeln!(
                    io::stderr(),
                    "[SWP-JSONL] write to {} failed; activity goes to stderr",
                    self.path.display()
                );
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }
}

// ──────────────────────── helpers ────────────────────────

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| SweepError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SweepError::io(path, source))
}

/// Format current UTC time as ISO 8601.
pub(crate) fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
