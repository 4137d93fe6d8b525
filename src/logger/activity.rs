//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Everything else records
//! diagnostics through an [`ActivityLoggerHandle`], which forwards over a
//! bounded crossbeam channel with `try_send` so sessions are never blocked by
//! logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{Result, TileError};
use crate::logger::diagnostics::{Diagnostic, DiagnosticSink};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

enum LoggerMsg {
    Record(Diagnostic),
    Shutdown,
}

/// Cheaply cloneable, non-blocking handle to the logger thread.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<LoggerMsg>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Diagnostics dropped because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LoggerMsg::Shutdown);
    }
}

impl DiagnosticSink for ActivityLoggerHandle {
    fn record(&self, diagnostic: Diagnostic) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(LoggerMsg::Record(diagnostic)) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }
}

/// Spawn the logger thread.
///
/// The thread runs until [`ActivityLoggerHandle::shutdown`] is called or every
/// handle is dropped.
pub fn spawn_logger(config: &LoggingConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<LoggerMsg>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };
    let jsonl = JsonlConfig::from(config);

    let join = thread::Builder::new()
        .name("stiles-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl, &dropped))
        .map_err(|e| TileError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<LoggerMsg>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(msg) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::LogBackpressure, Severity::Warning);
            warn.details = Some(format!("{lost} diagnostics dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        match msg {
            LoggerMsg::Record(diagnostic) => jsonl.write_entry(&to_log_entry(&diagnostic)),
            LoggerMsg::Shutdown => break,
        }
    }

    jsonl.flush();
}

/// Map a diagnostic onto its JSONL representation.
pub fn to_log_entry(diagnostic: &Diagnostic) -> LogEntry {
    let mut e = LogEntry::new(diagnostic.event_type(), diagnostic.severity());
    e.session = diagnostic.session().map(|s| s.get());
    e.row = diagnostic.row().map(|r| r + 1);
    e.details = Some(diagnostic.to_string());

    match diagnostic {
        Diagnostic::TextTruncated { column, .. } | Diagnostic::BudgetTrimmed { column, .. } => {
            e.field = Some(column.to_string());
        }
        Diagnostic::UrlRejected { column, .. } => e.field = Some(column.to_string()),
        Diagnostic::SessionOpened { owner, .. } => {
            e.actor = Some(owner.to_string());
            e.ok = Some(true);
        }
        Diagnostic::Unauthorized { actor, .. } => {
            e.actor = Some(actor.to_string());
            e.ok = Some(false);
        }
        Diagnostic::RefreshSucceeded { .. } => e.ok = Some(true),
        Diagnostic::RefreshFailed { .. }
        | Diagnostic::DecodeFailed { .. }
        | Diagnostic::DeliveryFailed { .. } => e.ok = Some(false),
        _ => {}
    }
    e
}
