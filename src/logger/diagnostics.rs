//! Non-fatal diagnostics and the sinks that receive them.
//!
//! Every degraded-but-handled condition (a skipped row, a truncated title, a
//! rejected link, an expired session) becomes a [`Diagnostic`] delivered to an
//! explicit [`DiagnosticSink`]. Sinks are handed to the validator and to each
//! session at construction; nothing here is global.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::logger::jsonl::{EventType, Severity};
use crate::session::{ActorId, RefreshFailure, SessionId};
use crate::tiles::decode::DecodeError;

/// Free-text columns subject to truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColumn {
    Title,
    Description,
    Author,
    Footer,
    /// Zero-based field index.
    FieldName(usize),
    /// Zero-based field index.
    FieldValue(usize),
}

impl fmt::Display for TextColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => f.write_str("title"),
            Self::Description => f.write_str("description"),
            Self::Author => f.write_str("author"),
            Self::Footer => f.write_str("footer"),
            Self::FieldName(i) => write!(f, "field {} name", i + 1),
            Self::FieldValue(i) => write!(f, "field {} value", i + 1),
        }
    }
}

/// Link columns validated against the accepted schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkColumn {
    Title,
    Author,
}

impl fmt::Display for LinkColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => f.write_str("title link"),
            Self::Author => f.write_str("author link"),
        }
    }
}

/// Why fields were removed from a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// More pairs than the platform's field cap.
    FieldLimit,
    /// Total serialized size over budget.
    SizeBudget,
}

/// A degraded-but-handled condition, for operators rather than end users.
///
/// Row indices are zero-based; `Display` renders them one-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    RowSkipped {
        row: usize,
        cells: usize,
    },
    TextTruncated {
        row: usize,
        column: TextColumn,
        original: usize,
        max: usize,
    },
    UrlRejected {
        row: usize,
        column: LinkColumn,
        value: String,
    },
    ColorCoerced {
        row: usize,
        raw: String,
        fallback: u32,
    },
    FieldsDropped {
        row: usize,
        dropped: usize,
        reason: DropReason,
    },
    BudgetTrimmed {
        row: usize,
        column: TextColumn,
        removed: usize,
    },
    SessionOpened {
        session: SessionId,
        owner: ActorId,
        tiles: usize,
    },
    SessionEmpty {
        session: Option<SessionId>,
    },
    DecodeFailed {
        session: Option<SessionId>,
        error: DecodeError,
    },
    Unauthorized {
        session: SessionId,
        actor: ActorId,
    },
    RefreshSucceeded {
        session: SessionId,
        tiles: usize,
        cursor: usize,
    },
    RefreshFailed {
        session: SessionId,
        reason: RefreshFailure,
    },
    SessionExpired {
        session: SessionId,
        idle: Duration,
    },
    DeliveryFailed {
        session: SessionId,
        details: String,
    },
}

impl Diagnostic {
    /// Severity used when the diagnostic is written to the activity log.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::TextTruncated { .. }
            | Self::SessionOpened { .. }
            | Self::SessionEmpty { .. }
            | Self::RefreshSucceeded { .. }
            | Self::SessionExpired { .. } => Severity::Info,
            Self::RowSkipped { .. }
            | Self::UrlRejected { .. }
            | Self::ColorCoerced { .. }
            | Self::FieldsDropped { .. }
            | Self::BudgetTrimmed { .. }
            | Self::DecodeFailed { .. }
            | Self::Unauthorized { .. }
            | Self::RefreshFailed { .. } => Severity::Warning,
            Self::DeliveryFailed { .. } => Severity::Critical,
        }
    }

    /// Activity-log event type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::RowSkipped { .. } => EventType::RowSkipped,
            Self::TextTruncated { .. } => EventType::TextTruncated,
            Self::UrlRejected { .. } => EventType::UrlRejected,
            Self::ColorCoerced { .. } => EventType::ColorCoerced,
            Self::FieldsDropped { .. } => EventType::FieldsDropped,
            Self::BudgetTrimmed { .. } => EventType::BudgetTrimmed,
            Self::SessionOpened { .. } => EventType::SessionOpened,
            Self::SessionEmpty { .. } => EventType::SessionEmpty,
            Self::DecodeFailed { .. } => EventType::DecodeFailed,
            Self::Unauthorized { .. } => EventType::Unauthorized,
            Self::RefreshSucceeded { .. } => EventType::RefreshSucceeded,
            Self::RefreshFailed { .. } => EventType::RefreshFailed,
            Self::SessionExpired { .. } => EventType::SessionExpired,
            Self::DeliveryFailed { .. } => EventType::DeliveryFailed,
        }
    }

    /// Zero-based source row, for validation diagnostics.
    #[must_use]
    pub const fn row(&self) -> Option<usize> {
        match self {
            Self::RowSkipped { row, .. }
            | Self::TextTruncated { row, .. }
            | Self::UrlRejected { row, .. }
            | Self::ColorCoerced { row, .. }
            | Self::FieldsDropped { row, .. }
            | Self::BudgetTrimmed { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// Owning session, for session diagnostics.
    #[must_use]
    pub const fn session(&self) -> Option<SessionId> {
        match self {
            Self::SessionOpened { session, .. }
            | Self::Unauthorized { session, .. }
            | Self::RefreshSucceeded { session, .. }
            | Self::RefreshFailed { session, .. }
            | Self::SessionExpired { session, .. }
            | Self::DeliveryFailed { session, .. } => Some(*session),
            Self::SessionEmpty { session } | Self::DecodeFailed { session, .. } => *session,
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowSkipped { row, cells } => write!(
                f,
                "row {}: {cells} cells, fewer than the 7 required columns; skipped",
                row + 1
            ),
            Self::TextTruncated {
                row,
                column,
                original,
                max,
            } => write!(
                f,
                "row {}: {column} truncated from {original} to {max} chars",
                row + 1
            ),
            Self::UrlRejected { row, column, value } => write!(
                f,
                "row {}: invalid {column} {value:?}; treating as empty",
                row + 1
            ),
            Self::ColorCoerced { row, raw, fallback } => write!(
                f,
                "row {}: invalid color value {raw:?}, using {fallback}",
                row + 1
            ),
            Self::FieldsDropped {
                row,
                dropped,
                reason,
            } => match reason {
                DropReason::FieldLimit => write!(
                    f,
                    "row {}: {dropped} field pair(s) beyond the 25-field cap dropped",
                    row + 1
                ),
                DropReason::SizeBudget => write!(
                    f,
                    "row {}: {dropped} trailing field(s) dropped for the 6000 char limit",
                    row + 1
                ),
            },
            Self::BudgetTrimmed {
                row,
                column,
                removed,
            } => write!(
                f,
                "row {}: {column} shortened by {removed} chars for the 6000 char limit",
                row + 1
            ),
            Self::SessionOpened {
                session,
                owner,
                tiles,
            } => write!(f, "{session}: opened for {owner} (showing 1/{tiles})"),
            Self::SessionEmpty { session } => match session {
                Some(id) => write!(f, "{id}: nothing to display"),
                None => f.write_str("nothing to display"),
            },
            Self::DecodeFailed { session, error } => match session {
                Some(id) => write!(f, "{id}: {error}"),
                None => write!(f, "{error}"),
            },
            Self::Unauthorized { session, actor } => {
                write!(f, "{session}: rejected interaction from {actor}")
            }
            Self::RefreshSucceeded {
                session,
                tiles,
                cursor,
            } => write!(
                f,
                "{session}: refreshed ({tiles} items, showing {})",
                cursor + 1
            ),
            Self::RefreshFailed { session, reason } => {
                write!(f, "{session}: refresh failed: {reason}")
            }
            Self::SessionExpired { session, idle } => write!(
                f,
                "{session}: expired after {}s of inactivity",
                idle.as_secs()
            ),
            Self::DeliveryFailed { session, details } => {
                write!(f, "{session}: display update failed: {details}")
            }
        }
    }
}

// ──────────────────── sinks ────────────────────

/// Receiver for diagnostics. Must never block for long or panic.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn record(&self, diagnostic: Diagnostic) {
        (**self).record(diagnostic);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _diagnostic: Diagnostic) {}
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Take everything recorded so far.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}

/// Forwards each diagnostic to every inner sink.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl DiagnosticSink for FanoutSink {
    fn record(&self, diagnostic: Diagnostic) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(diagnostic.clone());
            }
            last.record(diagnostic);
        }
    }
}
