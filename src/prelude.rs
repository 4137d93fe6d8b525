//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use sheet_tiles::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, TileError};

// Tiles
pub use crate::tiles::build_from_payload;
pub use crate::tiles::decode::{Cell, DecodeError, RawPayload, Rows, decode};
pub use crate::tiles::render::{Affordance, ControlSet, PlatformMessage, render};
pub use crate::tiles::spec::{TileField, TileSpecification, limits};
pub use crate::tiles::validate::{RowValidator, ValidationRules};

// Diagnostics
pub use crate::logger::activity::{ActivityLoggerHandle, spawn_logger};
pub use crate::logger::diagnostics::{Diagnostic, DiagnosticSink, FanoutSink, MemorySink, NullSink};

// Sessions
pub use crate::session::{
    ActorId, DisplayError, DisplaySink, FileSource, FnSource, NavState, NavigationSession,
    NoRefresh, Notice, OpenOutcome, RecordingDisplay, RefreshFailure, RefreshSource,
    RenderedUpdate, SessionContext, SessionId, SessionIds, TransitionError, TransitionKind,
};
