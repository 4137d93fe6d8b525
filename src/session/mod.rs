//! Interactive navigation sessions over a tile list.
//!
//! A session is opened once per host interaction, owned by a single actor,
//! and driven through named transitions until its inactivity watchdog
//! expires it. Sessions share no navigation state with each other.

#![allow(missing_docs)]

pub mod controller;
pub mod display;
pub mod navigator;
pub mod source;
pub mod watchdog;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tiles::decode::DecodeError;

/// Opaque identity supplied by the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for ActorId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session identifier, unique among the sessions of one [`SessionIds`]
/// sequence. Used only for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Hands out [`SessionId`]s starting at 1. Clones share the sequence.
#[derive(Debug, Clone, Default)]
pub struct SessionIds(Arc<AtomicU64>);

impl SessionIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Named transitions an actor can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    First,
    Previous,
    Next,
    Last,
    Refresh,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Previous => f.write_str("previous"),
            Self::Next => f.write_str("next"),
            Self::Last => f.write_str("last"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Why a refresh left the session unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    /// The source returned nothing.
    #[error("no data returned")]
    NoData,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A rejected transition request. The session is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("actor is not the owner of this view")]
    Unauthorized,
    #[error("a refresh is already in progress")]
    Busy,
    #[error("view has expired")]
    Expired,
    /// The transition is not available in the current state, e.g. refresh
    /// without a source or paging an empty view.
    #[error("{kind} is not available here")]
    Unsupported { kind: TransitionKind },
    #[error("refresh failed: {0}")]
    RefreshFailed(RefreshFailure),
}

pub use controller::{NavigationSession, OpenOutcome, SessionContext};
pub use display::{DisplayError, DisplayEvent, DisplaySink, Notice, RecordingDisplay, RenderedUpdate};
pub use navigator::{NavState, Navigator};
pub use source::{FileSource, FnSource, NoRefresh, RefreshSource};
