//! Activity logger: a dedicated thread owns the [`JsonlWriter`]; everyone else
//! sends [`ActivityEvent`]s over a bounded crossbeam channel.
//!
//! `send()` uses `try_send()`, so scheduler workers are never blocked by
//! logging back-pressure. Events that do not fit are counted and reported as
//! a single warning line once the channel drains.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SweepError};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::resource::Resource;

// ──────────────────── channel capacity ────────────────────

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Identity of a resource as recorded in the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_type: String,
    pub region: String,
    pub identifier: String,
}

impl From<&Resource> for ResourceRef {
    fn from(resource: &Resource) -> Self {
        Self {
            resource_type: resource.resource_type.clone(),
            region: resource.region.clone(),
            identifier: resource.identifier.clone(),
        }
    }
}

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    RunStarted {
        account: String,
        dry_run: bool,
        version: String,
        config_hash: String,
    },
    ScanFailed {
        resource_type: String,
        region: String,
        error_code: String,
        error_message: String,
    },
    ResourceClassified {
        resource: ResourceRef,
        filtered: bool,
        reason: String,
    },
    RemovalRequested {
        resource: ResourceRef,
        sweep: u32,
        attempt: u32,
    },
    RemovalFailed {
        resource: ResourceRef,
        sweep: u32,
        attempt: u32,
        error_code: String,
        error_message: String,
        retryable: bool,
    },
    StateChanged {
        resource: ResourceRef,
        sweep: u32,
        from: &'static str,
        to: &'static str,
    },
    SweepCompleted {
        sweep: u32,
        progressed: usize,
        remaining: usize,
        duration_ms: u64,
    },
    RunFinished {
        account: String,
        outcome: String,
        exit_code: i32,
        sweeps: u32,
        duration_ms: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply-cloneable handle for sending log events from any thread.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and counted.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

impl std::fmt::Debug for ActivityLoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLoggerHandle")
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

// ──────────────────── configuration ────────────────────

pub struct ActivityLoggerConfig {
    /// JSONL file the logger thread appends to.
    pub log_path: PathBuf,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The thread runs until `handle.shutdown()` is called or all senders are dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("sweep-logger".to_string())
        .spawn(move || logger_thread_main(rx, config.log_path, dropped_clone))
        .map_err(|e| SweepError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(rx: Receiver<ActivityEvent>, log_path: PathBuf, dropped: Arc<AtomicU64>) {
    let mut jsonl = JsonlWriter::open(log_path);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.close();
}

// ──────────────────── event conversion ────────────────────

fn with_resource(mut entry: LogEntry, resource: &ResourceRef) -> LogEntry {
    entry.resource_type = Some(resource.resource_type.clone());
    entry.region = Some(resource.region.clone());
    entry.identifier = Some(resource.identifier.clone());
    entry
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::RunStarted {
            account,
            dry_run,
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
            e.account = Some(account.clone());
            e.details = Some(format!(
                "version={version} config_hash={config_hash} dry_run={dry_run}"
            ));
            e
        }
        ActivityEvent::ScanFailed {
            resource_type,
            region,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::ScanFailure, Severity::Warning);
            e.resource_type = Some(resource_type.clone());
            e.region = Some(region.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::ResourceClassified {
            resource,
            filtered,
            reason,
        } => {
            let mut e = with_resource(
                LogEntry::new(EventType::ResourceClassified, Severity::Info),
                resource,
            );
            e.state = Some(if *filtered { "filtered" } else { "pending" }.to_string());
            e.reason = Some(reason.clone());
            e
        }
        ActivityEvent::RemovalRequested {
            resource,
            sweep,
            attempt,
        } => {
            let mut e = with_resource(
                LogEntry::new(EventType::RemovalRequested, Severity::Info),
                resource,
            );
            e.sweep = Some(*sweep);
            e.attempts = Some(*attempt);
            e
        }
        ActivityEvent::RemovalFailed {
            resource,
            sweep,
            attempt,
            error_code,
            error_message,
            retryable,
        } => {
            let severity = if *retryable {
                Severity::Warning
            } else {
                Severity::Critical
            };
            let mut e = with_resource(LogEntry::new(EventType::RemovalFailed, severity), resource);
            e.sweep = Some(*sweep);
            e.attempts = Some(*attempt);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::StateChanged {
            resource,
            sweep,
            from,
            to,
        } => {
            let mut e = with_resource(
                LogEntry::new(EventType::StateChange, Severity::Info),
                resource,
            );
            e.sweep = Some(*sweep);
            e.state = Some(format!("{from}->{to}"));
            e
        }
        ActivityEvent::SweepCompleted {
            sweep,
            progressed,
            remaining,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SweepComplete, Severity::Info);
            e.sweep = Some(*sweep);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("progressed={progressed} remaining={remaining}"));
            e
        }
        ActivityEvent::RunFinished {
            account,
            outcome,
            exit_code,
            sweeps,
            duration_ms,
        } => {
            let severity = if *exit_code == 0 {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::RunFinish, severity);
            e.account = Some(account.clone());
            e.sweep = Some(*sweeps);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(*exit_code == 0);
            e.details = Some(format!("outcome={outcome} exit_code={exit_code}"));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::RunFinish, Severity::Info),
    }
}

// ──────────────────── tests ────────────────────
