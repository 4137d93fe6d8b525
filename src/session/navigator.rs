//! Pure navigation state machine.
//!
//! No I/O, no locking, no clocks: callers pass `now` in. The live session in
//! [`super::controller`] wraps this in a mutex and performs the side effects.
//!
//! ```text
//!   Active(c) ──move──▶ Active(c')
//!   Active(c) ──begin_refresh──▶ Refreshing(c) ──finish ok──▶ Active(min(c, n-1)) | Empty
//!                                              ──finish err─▶ Active(c)
//!   Empty ──begin_refresh──▶ Refreshing(-)
//!   any ──expire──▶ Expired   (terminal)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::session::{RefreshFailure, TransitionError, TransitionKind};
use crate::tiles::spec::TileSpecification;

/// Navigation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Active { cursor: usize },
    /// A refresh is in flight. `cursor` is where the view stood, `None` when
    /// refreshing out of [`NavState::Empty`].
    Refreshing { cursor: Option<usize> },
    /// A refresh produced zero tiles; only another refresh is possible.
    Empty,
    Expired,
}

impl NavState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Active { .. } => "active",
            Self::Refreshing { .. } => "refreshing",
            Self::Empty => "empty",
            Self::Expired => "expired",
        }
    }
}

/// Tile list, cursor and lifecycle of one session.
#[derive(Debug, Clone)]
pub struct Navigator {
    tiles: Arc<[TileSpecification]>,
    state: NavState,
    refreshable: bool,
    last_activity: Instant,
    /// Cursor at the moment of expiry.
    last_cursor: Option<usize>,
}

impl Navigator {
    /// Start at the first tile, or in [`NavState::Empty`] when there are none.
    pub fn new(tiles: Vec<TileSpecification>, refreshable: bool, now: Instant) -> Self {
        let state = if tiles.is_empty() {
            NavState::Empty
        } else {
            NavState::Active { cursor: 0 }
        };
        Self {
            tiles: tiles.into(),
            state,
            refreshable,
            last_activity: now,
            last_cursor: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> NavState {
        self.state
    }

    /// Current position while a tile is showing.
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        match self.state {
            NavState::Active { cursor } => Some(cursor),
            NavState::Refreshing { cursor } => cursor,
            NavState::Empty | NavState::Expired => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Shared handle to the current tile list.
    #[must_use]
    pub fn tiles(&self) -> Arc<[TileSpecification]> {
        Arc::clone(&self.tiles)
    }

    /// Tile at the cursor. Still available after expiry for the final render.
    #[must_use]
    pub fn current(&self) -> Option<&TileSpecification> {
        match self.state {
            NavState::Expired => self.last_cursor.and_then(|c| self.tiles.get(c)),
            _ => self.cursor().and_then(|c| self.tiles.get(c)),
        }
    }

    #[must_use]
    pub const fn is_refreshable(&self) -> bool {
        self.refreshable
    }

    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Apply a cursor move. Returns whether the cursor changed; saturating
    /// moves at a boundary succeed with `false`.
    pub fn step(&mut self, kind: TransitionKind, now: Instant) -> Result<bool, TransitionError> {
        let cursor = match self.state {
            NavState::Active { cursor } => cursor,
            NavState::Refreshing { .. } => return Err(TransitionError::Busy),
            NavState::Expired => return Err(TransitionError::Expired),
            NavState::Empty => return Err(TransitionError::Unsupported { kind }),
        };
        let last = self.tiles.len().saturating_sub(1);
        let target = match kind {
            TransitionKind::First => 0,
            TransitionKind::Previous => cursor.saturating_sub(1),
            TransitionKind::Next => (cursor + 1).min(last),
            TransitionKind::Last => last,
            TransitionKind::Refresh => return Err(TransitionError::Unsupported { kind }),
        };

        self.state = NavState::Active { cursor: target };
        self.last_activity = now;
        Ok(target != cursor)
    }

    /// Enter [`NavState::Refreshing`]. At most one refresh is in flight.
    pub fn begin_refresh(&mut self) -> Result<(), TransitionError> {
        let cursor = match self.state {
            NavState::Expired => return Err(TransitionError::Expired),
            NavState::Refreshing { .. } => return Err(TransitionError::Busy),
            _ if !self.refreshable => {
                return Err(TransitionError::Unsupported {
                    kind: TransitionKind::Refresh,
                });
            }
            NavState::Active { cursor } => Some(cursor),
            NavState::Empty => None,
        };
        self.state = NavState::Refreshing { cursor };
        Ok(())
    }

    /// Complete the in-flight refresh.
    ///
    /// On success the tile list is replaced in one assignment and the cursor
    /// clamped into the new bounds. On failure the previous list and cursor
    /// stand. If the session expired meanwhile, the result is discarded.
    pub fn finish_refresh(
        &mut self,
        result: Result<Vec<TileSpecification>, RefreshFailure>,
        now: Instant,
    ) -> Result<(), TransitionError> {
        let previous = match self.state {
            NavState::Refreshing { cursor } => cursor,
            NavState::Expired => return Err(TransitionError::Expired),
            NavState::Active { .. } | NavState::Empty => {
                return Err(TransitionError::Unsupported {
                    kind: TransitionKind::Refresh,
                });
            }
        };

        match result {
            Ok(tiles) => {
                self.state = if tiles.is_empty() {
                    NavState::Empty
                } else {
                    NavState::Active {
                        cursor: previous.unwrap_or(0).min(tiles.len() - 1),
                    }
                };
                self.tiles = tiles.into();
                self.last_activity = now;
                Ok(())
            }
            Err(failure) => {
                self.state = previous.map_or(NavState::Empty, |cursor| NavState::Active { cursor });
                Err(TransitionError::RefreshFailed(failure))
            }
        }
    }

    /// Move to [`NavState::Expired`]. Returns `false` if already expired.
    pub fn expire(&mut self) -> bool {
        if self.state == NavState::Expired {
            return false;
        }
        self.last_cursor = self.cursor();
        self.state = NavState::Expired;
        true
    }
}
