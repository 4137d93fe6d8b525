//! Live navigation session.
//!
//! Wraps a [`Navigator`] in a mutex and performs the side effects around each
//! transition: authorization, the refresh fetch, rendering, delivery to the
//! display sink, diagnostics and the inactivity watchdog.
//!
//! Locking: cursor moves hold the session lock through render and delivery,
//! so transitions are applied and shown in request order. A refresh marks the
//! navigator `Refreshing`, drops the lock for the fetch, and takes it again to
//! swap the tile list. Requests arriving meanwhile get [`TransitionError::Busy`].
//! Display sinks must not call back into the session they are presenting.

#![allow(missing_docs)]

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::logger::diagnostics::{Diagnostic, DiagnosticSink};
use crate::session::display::{DisplaySink, Notice, RenderedUpdate};
use crate::session::navigator::{NavState, Navigator};
use crate::session::source::RefreshSource;
use crate::session::watchdog::Watchdog;
use crate::session::{
    ActorId, RefreshFailure, SessionId, SessionIds, TransitionError, TransitionKind,
};
use crate::tiles::build_from_payload;
use crate::tiles::decode::{DecodeError, RawPayload};
use crate::tiles::render::{ControlSet, PlatformMessage, render};
use crate::tiles::validate::{RowValidator, ValidationRules};

// ──────────────────── context ────────────────────

/// Collaborators and policy shared by the sessions a host opens.
#[derive(Clone)]
pub struct SessionContext {
    pub validator: RowValidator,
    pub display: Arc<dyn DisplaySink>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
    pub idle_timeout: Duration,
    /// Spawn a watchdog thread per session. Without one the host drives
    /// expiry through [`NavigationSession::check_idle`].
    pub watchdog: bool,
    /// Shared by clones, so every session opened from one context gets a
    /// distinct id.
    pub ids: SessionIds,
}

impl SessionContext {
    pub fn new(display: Arc<dyn DisplaySink>, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            validator: RowValidator::new(ValidationRules::default(), Arc::clone(&diagnostics)),
            display,
            diagnostics,
            idle_timeout: Duration::from_secs(300),
            watchdog: true,
            ids: SessionIds::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        display: Arc<dyn DisplaySink>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            validator: RowValidator::new(
                ValidationRules::from(&config.tiles),
                Arc::clone(&diagnostics),
            ),
            idle_timeout: config.session.idle_timeout(),
            ..Self::new(display, diagnostics)
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn without_watchdog(mut self) -> Self {
        self.watchdog = false;
        self
    }
}

// ──────────────────── open ────────────────────

/// Result of [`NavigationSession::open`].
pub enum OpenOutcome<S: RefreshSource + 'static> {
    Opened(NavigationSession<S>),
    /// The payload decoded to zero usable rows.
    Empty,
    DecodeFailed(DecodeError),
}

impl<S: RefreshSource + 'static> OpenOutcome<S> {
    /// The live session, if one was opened.
    pub fn into_session(self) -> Option<NavigationSession<S>> {
        match self {
            Self::Opened(session) => Some(session),
            Self::Empty | Self::DecodeFailed(_) => None,
        }
    }
}

impl<S: RefreshSource + 'static> std::fmt::Debug for OpenOutcome<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened(session) => write!(f, "Opened({})", session.id()),
            Self::Empty => f.write_str("Empty"),
            Self::DecodeFailed(e) => write!(f, "DecodeFailed({e:?})"),
        }
    }
}

// ──────────────────── session ────────────────────

struct Shared<S> {
    id: SessionId,
    owner: ActorId,
    nav: Mutex<Navigator>,
    source: S,
    ctx: SessionContext,
}

/// One live view, owned by one actor.
pub struct NavigationSession<S: RefreshSource + 'static> {
    shared: Arc<Shared<S>>,
    watchdog: Option<Watchdog>,
}

impl<S: RefreshSource + 'static> NavigationSession<S> {
    /// Open a session over `payload`, or over the source's first fetch when
    /// no payload is given.
    ///
    /// Every outcome is presented: the first tile with controls, or a status
    /// message for empty and unreadable data.
    pub fn open(
        payload: Option<RawPayload>,
        source: S,
        owner: ActorId,
        ctx: SessionContext,
    ) -> Result<OpenOutcome<S>> {
        let id = ctx.ids.next_id();
        let raw = payload.or_else(|| source.fetch());

        let tiles = match raw
            .ok_or(DecodeError::Empty)
            .and_then(|raw| build_from_payload(&raw, &ctx.validator))
        {
            Ok(tiles) => tiles,
            Err(error) => {
                ctx.diagnostics.record(Diagnostic::DecodeFailed {
                    session: None,
                    error: error.clone(),
                });
                present_status(&ctx, id, PlatformMessage::decode_failure(&error));
                return Ok(OpenOutcome::DecodeFailed(error));
            }
        };

        if tiles.is_empty() {
            ctx.diagnostics.record(Diagnostic::SessionEmpty { session: None });
            present_status(&ctx, id, PlatformMessage::no_data());
            return Ok(OpenOutcome::Empty);
        }

        ctx.diagnostics.record(Diagnostic::SessionOpened {
            session: id,
            owner: owner.clone(),
            tiles: tiles.len(),
        });

        let navigator = Navigator::new(tiles, source.is_enabled(), Instant::now());
        let idle_timeout = ctx.idle_timeout;
        let spawn_watchdog = ctx.watchdog;
        let shared = Arc::new(Shared {
            id,
            owner,
            nav: Mutex::new(navigator),
            source,
            ctx,
        });

        {
            let nav = shared.nav.lock();
            let update = shared.snapshot(&nav, true);
            shared.deliver(&update);
        }

        let watchdog = if spawn_watchdog {
            let weak: Weak<Shared<S>> = Arc::downgrade(&shared);
            Some(Watchdog::spawn(
                &format!("stiles-{id}"),
                idle_timeout,
                move |now| weak.upgrade().and_then(|shared| shared.poll_idle(now)),
            )?)
        } else {
            None
        };

        Ok(OpenOutcome::Opened(Self { shared, watchdog }))
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    #[must_use]
    pub fn owner(&self) -> &ActorId {
        &self.shared.owner
    }

    pub fn state(&self) -> NavState {
        self.shared.nav.lock().state()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.shared.nav.lock().cursor()
    }

    pub fn len(&self) -> usize {
        self.shared.nav.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.nav.lock().is_empty()
    }

    pub fn is_expired(&self) -> bool {
        self.state() == NavState::Expired
    }

    /// What the view currently shows, without delivering it.
    pub fn current(&self) -> RenderedUpdate {
        let nav = self.shared.nav.lock();
        self.shared.snapshot(&nav, false)
    }

    /// Apply `kind` on behalf of `actor`.
    ///
    /// Rejections are reported to the actor as an ephemeral notice and leave
    /// the session untouched.
    pub fn transition(
        &self,
        kind: TransitionKind,
        actor: &ActorId,
    ) -> std::result::Result<RenderedUpdate, TransitionError> {
        let result = if *actor == self.shared.owner {
            match kind {
                TransitionKind::Refresh => self.shared.refresh(),
                _ => self.shared.step(kind),
            }
        } else {
            self.shared.ctx.diagnostics.record(Diagnostic::Unauthorized {
                session: self.shared.id,
                actor: actor.clone(),
            });
            Err(TransitionError::Unauthorized)
        };

        if let Err(error) = &result
            && let Some(notice) = Notice::for_error(error)
        {
            self.shared.notify(actor, &notice);
        }
        result
    }

    /// Expire now if idle for at least the configured timeout.
    /// Returns whether the session is expired afterwards.
    pub fn check_idle(&self, now: Instant) -> bool {
        self.shared.poll_idle(now).is_none()
    }

    /// Force expiry, presenting the final disabled view.
    pub fn expire(&self) -> bool {
        let mut nav = self.shared.nav.lock();
        let idle = nav.idle_for(Instant::now());
        self.shared.expire_locked(&mut nav, idle)
    }
}

impl<S: RefreshSource + 'static> Drop for NavigationSession<S> {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
    }
}

impl<S: RefreshSource> Shared<S> {
    fn step(&self, kind: TransitionKind) -> std::result::Result<RenderedUpdate, TransitionError> {
        let mut nav = self.nav.lock();
        let changed = nav.step(kind, Instant::now())?;
        let update = self.snapshot(&nav, changed);
        if changed {
            self.deliver(&update);
        }
        Ok(update)
    }

    fn refresh(&self) -> std::result::Result<RenderedUpdate, TransitionError> {
        self.nav.lock().begin_refresh()?;

        let result = match self.source.fetch() {
            None => Err(RefreshFailure::NoData),
            Some(raw) => build_from_payload(&raw, &self.ctx.validator).map_err(RefreshFailure::from),
        };

        let mut nav = self.nav.lock();
        match nav.finish_refresh(result, Instant::now()) {
            Ok(()) => {
                if nav.is_empty() {
                    self.ctx.diagnostics.record(Diagnostic::SessionEmpty {
                        session: Some(self.id),
                    });
                } else {
                    self.ctx.diagnostics.record(Diagnostic::RefreshSucceeded {
                        session: self.id,
                        tiles: nav.len(),
                        cursor: nav.cursor().unwrap_or(0),
                    });
                }
                let update = self.snapshot(&nav, true);
                self.deliver(&update);
                Ok(update)
            }
            Err(TransitionError::RefreshFailed(reason)) => {
                self.ctx.diagnostics.record(Diagnostic::RefreshFailed {
                    session: self.id,
                    reason: reason.clone(),
                });
                Err(TransitionError::RefreshFailed(reason))
            }
            Err(other) => Err(other),
        }
    }

    /// Remaining wait before the session could go idle, or `None` once expired.
    fn poll_idle(&self, now: Instant) -> Option<Duration> {
        let mut nav = self.nav.lock();
        if nav.state() == NavState::Expired {
            return None;
        }
        let idle = nav.idle_for(now);
        if idle >= self.ctx.idle_timeout {
            self.expire_locked(&mut nav, idle);
            None
        } else {
            Some(self.ctx.idle_timeout - idle)
        }
    }

    fn expire_locked(&self, nav: &mut Navigator, idle: Duration) -> bool {
        if !nav.expire() {
            return false;
        }
        self.ctx.diagnostics.record(Diagnostic::SessionExpired {
            session: self.id,
            idle,
        });
        let update = self.snapshot(nav, true);
        self.deliver(&update);
        true
    }

    fn snapshot(&self, nav: &Navigator, changed: bool) -> RenderedUpdate {
        let total = nav.len();
        let (message, controls, cursor) = match nav.state() {
            NavState::Active { cursor } | NavState::Refreshing { cursor: Some(cursor) } => (
                nav.current().map_or_else(PlatformMessage::no_data, render),
                ControlSet::for_page(cursor, total, nav.is_refreshable()),
                Some(cursor),
            ),
            NavState::Refreshing { cursor: None } | NavState::Empty => {
                let controls = if nav.is_refreshable() {
                    ControlSet::refresh_only()
                } else {
                    ControlSet::none()
                };
                (PlatformMessage::no_data(), controls, None)
            }
            NavState::Expired => (
                nav.current()
                    .map_or_else(PlatformMessage::no_data, render)
                    .expired(),
                ControlSet::none(),
                None,
            ),
        };

        RenderedUpdate {
            session: self.id,
            message,
            controls,
            cursor,
            total,
            changed,
        }
    }

    fn deliver(&self, update: &RenderedUpdate) {
        if let Err(e) = self.ctx.display.present(update) {
            self.ctx.diagnostics.record(Diagnostic::DeliveryFailed {
                session: self.id,
                details: e.to_string(),
            });
        }
    }

    fn notify(&self, actor: &ActorId, notice: &Notice) {
        if let Err(e) = self.ctx.display.notify(actor, notice) {
            self.ctx.diagnostics.record(Diagnostic::DeliveryFailed {
                session: self.id,
                details: e.to_string(),
            });
        }
    }
}

fn present_status(ctx: &SessionContext, id: SessionId, message: PlatformMessage) {
    let update = RenderedUpdate {
        session: id,
        message,
        controls: ControlSet::none(),
        cursor: None,
        total: 0,
        changed: true,
    };
    if let Err(e) = ctx.display.present(&update) {
        ctx.diagnostics.record(Diagnostic::DeliveryFailed {
            session: id,
            details: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::diagnostics::MemorySink;
    use crate::session::display::RecordingDisplay;
    use crate::session::source::{FnSource, NoRefresh};
    use crate::tiles::render::Affordance;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const THREE_ROWS: &str = r#"[
        ["one","","","1","","",""],
        ["two","","","2","","",""],
        ["three","","","3","","",""]
    ]"#;

    struct Harness {
        display: Arc<RecordingDisplay>,
        sink: Arc<MemorySink>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                display: Arc::new(RecordingDisplay::new()),
                sink: Arc::new(MemorySink::new()),
            }
        }

        fn ctx(&self) -> SessionContext {
            SessionContext::new(self.display.clone(), self.sink.clone()).without_watchdog()
        }

        fn open<S: RefreshSource + 'static>(&self, raw: &str, source: S) -> NavigationSession<S> {
            NavigationSession::open(Some(raw.to_string()), source, owner(), self.ctx())
                .unwrap()
                .into_session()
                .unwrap()
        }
    }

    fn owner() -> ActorId {
        ActorId::from("owner")
    }

    fn title(update: &RenderedUpdate) -> Option<&str> {
        update.message.title.as_deref()
    }

    #[test]
    fn open_presents_first_tile() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, NoRefresh);
        assert_eq!(session.state(), NavState::Active { cursor: 0 });
        let shown = h.display.last_presented().unwrap();
        assert_eq!(title(&shown), Some("one"));
        assert_eq!(shown.controls.controls[2].label, "1/3");
        assert!(!shown.controls.contains(Affordance::Refresh));
        assert!(matches!(h.sink.snapshot()[0], Diagnostic::SessionOpened { tiles: 3, .. }));
    }

    #[test]
    fn open_empty_and_malformed() {
        let h = Harness::new();
        let empty = NavigationSession::open(Some("[]".into()), NoRefresh, owner(), h.ctx()).unwrap();
        assert!(matches!(empty, OpenOutcome::Empty));
        assert_eq!(
            title(&h.display.last_presented().unwrap()),
            Some("No Data")
        );

        let bad = NavigationSession::open(Some("{".into()), NoRefresh, owner(), h.ctx()).unwrap();
        assert!(matches!(bad, OpenOutcome::DecodeFailed(DecodeError::Malformed { .. })));
        assert_eq!(
            h.display.last_presented().unwrap().message.description.as_deref(),
            Some("Failed to parse JSON data")
        );
    }

    #[test]
    fn open_without_payload_fetches_once() {
        let h = Harness::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = FnSource(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(THREE_ROWS.to_string())
        });
        let session = NavigationSession::open(None, source, owner(), h.ctx())
            .unwrap()
            .into_session()
            .unwrap();
        assert_eq!(session.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_without_payload_or_data_fails() {
        let h = Harness::new();
        let outcome = NavigationSession::open(None, NoRefresh, owner(), h.ctx()).unwrap();
        assert!(matches!(outcome, OpenOutcome::DecodeFailed(DecodeError::Empty)));
        assert_eq!(
            h.display.last_presented().unwrap().message.description.as_deref(),
            Some("No data provided")
        );
    }

    #[test]
    fn moves_render_and_deliver() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, NoRefresh);
        let update = session.transition(TransitionKind::Next, &owner()).unwrap();
        assert!(update.changed);
        assert_eq!(title(&update), Some("two"));
        assert_eq!(update.cursor, Some(1));
        let update = session.transition(TransitionKind::Last, &owner()).unwrap();
        assert_eq!(title(&update), Some("three"));
        assert_eq!(h.display.presented().len(), 3);
    }

    #[test]
    fn saturating_move_is_not_redelivered() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, NoRefresh);
        let update = session.transition(TransitionKind::Previous, &owner()).unwrap();
        assert!(!update.changed);
        assert_eq!(title(&update), Some("one"));
        assert_eq!(h.display.presented().len(), 1);
    }

    #[test]
    fn other_actor_is_rejected_and_notified() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, NoRefresh);
        let intruder = ActorId::from("intruder");

        let err = session.transition(TransitionKind::Next, &intruder).unwrap_err();
        assert_eq!(err, TransitionError::Unauthorized);
        assert_eq!(session.cursor(), Some(0));
        assert_eq!(h.display.presented().len(), 1);
        assert_eq!(h.display.notices(), vec![(intruder, Notice::NotYourView)]);
        assert!(h.sink.snapshot().iter().any(|d| matches!(d, Diagnostic::Unauthorized { .. })));
    }

    #[test]
    fn refresh_without_source_is_unsupported() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, NoRefresh);
        let err = session.transition(TransitionKind::Refresh, &owner()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Unsupported {
                kind: TransitionKind::Refresh
            }
        );
        assert!(h.display.notices().is_empty());
    }

    #[test]
    fn refresh_swaps_and_clamps() {
        let h = Harness::new();
        let source = FnSource(|| Some(r#"[["new","","","9","","",""]]"#.to_string()));
        let session = h.open(THREE_ROWS, source);
        session.transition(TransitionKind::Last, &owner()).unwrap();

        let update = session.transition(TransitionKind::Refresh, &owner()).unwrap();
        assert_eq!(update.cursor, Some(0));
        assert_eq!(update.total, 1);
        assert_eq!(title(&update), Some("new"));
        assert!(update.controls.is_enabled(Affordance::Refresh));
    }

    #[test]
    fn failed_refresh_keeps_view_and_notifies() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, FnSource(|| Some("not json".to_string())));
        session.transition(TransitionKind::Next, &owner()).unwrap();
        let before = session.current();
        let presented_before = h.display.presented().len();

        let err = session.transition(TransitionKind::Refresh, &owner()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::RefreshFailed(RefreshFailure::Decode(_))
        ));
        assert_eq!(session.current(), before);
        assert_eq!(h.display.presented().len(), presented_before);
        assert_eq!(h.display.notices()[0].1.to_string(), "❌ Refresh failed: Invalid JSON");
    }

    #[test]
    fn refresh_with_no_data() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, FnSource(|| None));
        let err = session.transition(TransitionKind::Refresh, &owner()).unwrap_err();
        assert_eq!(err, TransitionError::RefreshFailed(RefreshFailure::NoData));
        assert_eq!(session.state(), NavState::Active { cursor: 0 });
    }

    #[test]
    fn refresh_to_nothing_shows_no_data_with_refresh_only() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, FnSource(|| Some("[]".to_string())));
        let update = session.transition(TransitionKind::Refresh, &owner()).unwrap();
        assert_eq!(session.state(), NavState::Empty);
        assert_eq!(title(&update), Some("No Data"));
        assert_eq!(update.controls, ControlSet::refresh_only());
        assert!(session.transition(TransitionKind::Next, &owner()).is_err());
    }

    #[test]
    fn idle_session_expires_and_rejects() {
        let h = Harness::new();
        let ctx = h.ctx().with_idle_timeout(Duration::from_secs(60));
        let session = NavigationSession::open(Some(THREE_ROWS.into()), NoRefresh, owner(), ctx)
            .unwrap()
            .into_session()
            .unwrap();

        assert!(!session.check_idle(Instant::now()));
        assert!(session.check_idle(Instant::now() + Duration::from_secs(61)));
        let last = h.display.last_presented().unwrap();
        assert!(last.controls.is_empty());
        assert!(
            last.message
                .footer
                .as_ref()
                .is_some_and(|f| f.text.contains("View expired"))
        );

        assert_eq!(
            session.transition(TransitionKind::Next, &owner()),
            Err(TransitionError::Expired)
        );
        assert_eq!(h.display.notices()[0].1, Notice::Expired);
        assert!(!session.expire());
    }

    #[test]
    fn delivery_failure_keeps_state() {
        let h = Harness::new();
        let session = h.open(THREE_ROWS, NoRefresh);
        h.display.set_failing(true);
        let update = session.transition(TransitionKind::Next, &owner()).unwrap();
        assert_eq!(update.cursor, Some(1));
        assert_eq!(session.cursor(), Some(1));
        assert!(h.sink.snapshot().iter().any(|d| matches!(d, Diagnostic::DeliveryFailed { .. })));
    }

    #[test]
    fn expiring_a_full_size_tile_stays_within_limits() {
        use crate::tiles::render::EXPIRED_FOOTER;
        use crate::tiles::spec::limits;

        let h = Harness::new();
        let row = serde_json::json!([[
            "t".repeat(limits::TITLE),
            "d".repeat(limits::DESCRIPTION),
            "",
            "",
            "",
            "",
            "f".repeat(3000),
        ]]);
        let session = h.open(&row.to_string(), NoRefresh);
        let opened = h.display.last_presented().unwrap();
        assert_eq!(opened.message.serialized_len(), limits::TOTAL);

        assert!(session.check_idle(Instant::now() + Duration::from_secs(301)));
        let last = h.display.last_presented().unwrap();
        assert!(last.controls.is_empty());
        assert!(last.message.serialized_len() <= limits::TOTAL);
        let footer = last.message.footer.unwrap().text;
        assert!(footer.chars().count() <= limits::FOOTER);
        assert!(footer.ends_with(EXPIRED_FOOTER));
        assert_eq!(last.message.description, opened.message.description);
    }
}
