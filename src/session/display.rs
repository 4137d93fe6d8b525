//! Display sink: where rendered tiles and ephemeral notices go.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::session::{ActorId, RefreshFailure, SessionId, TransitionError};
use crate::tiles::render::{ControlSet, PlatformMessage};

/// Failure reported by a display sink. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("display rejected the update: {details}")]
    Rejected { details: String },
    #[error("display is gone")]
    Closed,
}

/// What the host should show after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedUpdate {
    #[serde(serialize_with = "serialize_session")]
    pub session: SessionId,
    pub message: PlatformMessage,
    pub controls: ControlSet,
    /// Zero-based position of the shown tile, if one is shown.
    pub cursor: Option<usize>,
    pub total: usize,
    /// False for saturating moves that left the view as it was.
    pub changed: bool,
}

fn serialize_session<S: serde::Serializer>(id: &SessionId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(id.get())
}

/// Ephemeral, actor-only messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NotYourView,
    RefreshFailed(RefreshFailure),
    RefreshInProgress,
    Expired,
}

impl Notice {
    /// The notice an actor sees for a rejected transition, if any.
    #[must_use]
    pub fn for_error(error: &TransitionError) -> Option<Self> {
        match error {
            TransitionError::Unauthorized => Some(Self::NotYourView),
            TransitionError::Busy => Some(Self::RefreshInProgress),
            TransitionError::Expired => Some(Self::Expired),
            TransitionError::RefreshFailed(failure) => Some(Self::RefreshFailed(failure.clone())),
            TransitionError::Unsupported { .. } => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYourView => f.write_str("❌ Not your view"),
            Self::RefreshFailed(RefreshFailure::NoData) => {
                f.write_str("❌ Refresh failed: No data returned")
            }
            Self::RefreshFailed(RefreshFailure::Decode(_)) => {
                f.write_str("❌ Refresh failed: Invalid JSON")
            }
            Self::RefreshInProgress => f.write_str("⏳ Refresh already in progress"),
            Self::Expired => f.write_str("⏱️ This view has expired"),
        }
    }
}

/// Shows rendered updates and notices to actors.
pub trait DisplaySink: Send + Sync {
    /// Show or replace the session's message and controls.
    fn present(&self, update: &RenderedUpdate) -> Result<(), DisplayError>;

    /// Show `notice` to `actor` only.
    fn notify(&self, actor: &ActorId, notice: &Notice) -> Result<(), DisplayError>;
}

impl<T: DisplaySink + ?Sized> DisplaySink for Arc<T> {
    fn present(&self, update: &RenderedUpdate) -> Result<(), DisplayError> {
        (**self).present(update)
    }

    fn notify(&self, actor: &ActorId, notice: &Notice) -> Result<(), DisplayError> {
        (**self).notify(actor, notice)
    }
}

/// Everything a [`RecordingDisplay`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Presented(RenderedUpdate),
    Notified(ActorId, Notice),
}

/// In-memory display. Can be told to fail presents.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
    failing: AtomicBool,
}

impl RecordingDisplay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent presents fail (they are still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().clone()
    }

    pub fn presented(&self) -> Vec<RenderedUpdate> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DisplayEvent::Presented(u) => Some(u.clone()),
                DisplayEvent::Notified(..) => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<(ActorId, Notice)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DisplayEvent::Notified(actor, notice) => Some((actor.clone(), notice.clone())),
                DisplayEvent::Presented(_) => None,
            })
            .collect()
    }

    pub fn last_presented(&self) -> Option<RenderedUpdate> {
        self.presented().pop()
    }
}

impl DisplaySink for RecordingDisplay {
    fn present(&self, update: &RenderedUpdate) -> Result<(), DisplayError> {
        self.events.lock().push(DisplayEvent::Presented(update.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(DisplayError::Rejected {
                details: "recording display set to fail".to_string(),
            });
        }
        Ok(())
    }

    fn notify(&self, actor: &ActorId, notice: &Notice) -> Result<(), DisplayError> {
        self.events
            .lock()
            .push(DisplayEvent::Notified(actor.clone(), notice.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::decode::DecodeError;

    #[test]
    fn notice_texts() {
        assert_eq!(Notice::NotYourView.to_string(), "❌ Not your view");
        assert_eq!(
            Notice::RefreshFailed(RefreshFailure::NoData).to_string(),
            "❌ Refresh failed: No data returned"
        );
        assert_eq!(
            Notice::RefreshFailed(RefreshFailure::Decode(DecodeError::Empty)).to_string(),
            "❌ Refresh failed: Invalid JSON"
        );
    }

    #[test]
    fn notices_for_errors() {
        assert_eq!(
            Notice::for_error(&TransitionError::Unauthorized),
            Some(Notice::NotYourView)
        );
        assert_eq!(
            Notice::for_error(&TransitionError::Busy),
            Some(Notice::RefreshInProgress)
        );
        assert_eq!(
            Notice::for_error(&TransitionError::Unsupported {
                kind: crate::session::TransitionKind::Refresh
            }),
            None
        );
    }

    #[test]
    fn recording_display_can_fail() {
        let display = RecordingDisplay::new();
        let update = RenderedUpdate {
            session: SessionId::new(1),
            message: PlatformMessage::no_data(),
            controls: ControlSet::none(),
            cursor: None,
            total: 0,
            changed: true,
        };
        assert!(display.present(&update).is_ok());
        display.set_failing(true);
        assert!(display.present(&update).is_err());
        assert_eq!(display.presented().len(), 2);
        display.notify(&ActorId::from("a"), &Notice::Expired).unwrap();
        assert_eq!(display.notices().len(), 1);
    }
}
