#![forbid(unsafe_code)]

//! Sheet Tiles: paginated rich-message "tiles" from spreadsheet rows.
//!
//! The pipeline turns a loosely-typed JSON payload into validated,
//! size-bounded tile specifications, and a navigation session pages through
//! them on behalf of a single owner:
//!
//! 1. **Decode**: raw text → rows of scalar cells ([`tiles::decode`])
//! 2. **Validate**: rows → tiles within the platform limits ([`tiles::validate`])
//! 3. **Render**: tile → platform message + controls ([`tiles::render`])
//! 4. **Navigate**: cursor moves, refresh and expiry ([`session`])
//!
//! # Library usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sheet_tiles::prelude::*;
//!
//! let display = Arc::new(RecordingDisplay::new());
//! let sink = Arc::new(MemorySink::new());
//! let ctx = SessionContext::new(display, sink);
//! let _outcome = NavigationSession::open(
//!     Some(r#"[["T","D","","65280","","","F","Driver","Jim"]]"#.to_string()),
//!     NoRefresh,
//!     ActorId::from("owner"),
//!     ctx,
//! )?;
//! # Ok::<(), sheet_tiles::core::errors::TileError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod session;
pub mod tiles;
