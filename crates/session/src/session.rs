//! Virtual display session management.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use projector_common::error::{ProjectorError, ProjectorResult};
use projector_platform_core::{
    DisplayConfig, DisplayId, DisplayManager, Proxy, ServiceRegistry, VirtualDisplayCallback,
};
use serde::Serialize;

use crate::sink::{LifecycleEvent, LifecycleSink};
use crate::token::{CapabilityToken, TokenId};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// State of a virtual display session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session created, no display requested yet.
    Idle,
    /// Display creation in flight.
    Opening,
    /// Display exists and is rendering.
    Active,
    /// Display exists, rendering suspended by the platform.
    Paused,
    /// Teardown in flight.
    Releasing,
    /// Terminal. Holds no remote resources.
    Released,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        *self == SessionState::Released
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Releasing => "releasing",
            SessionState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Why a session reached `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownCause {
    /// [`VirtualDisplaySession::release`] was called.
    CallerRelease,
    /// The platform stopped the display.
    DisplayStopped,
    /// The capability token was revoked.
    TokenRevoked,
    /// Display creation failed; nothing was created.
    OpenFailed,
    /// The session was dropped while holding a display.
    Dropped,
}

impl fmt::Display for TeardownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownCause::CallerRelease => "caller_release",
            TeardownCause::DisplayStopped => "display_stopped",
            TeardownCause::TokenRevoked => "token_revoked",
            TeardownCause::OpenFailed => "open_failed",
            TeardownCause::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// Point-in-time snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub state: SessionState,
    pub display_id: Option<DisplayId>,
    pub token_id: Option<TokenId>,
    pub name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub density: Option<u32>,
    pub opened_at: Option<DateTime<Utc>>,
    pub teardown: Option<TeardownCause>,
}

/// Remote resources handed from the state machine to a teardown.
struct Resources {
    display_id: Option<DisplayId>,
    token: Option<CapabilityToken>,
}

struct SessionCore {
    state: SessionState,
    display_id: Option<DisplayId>,
    token: Option<CapabilityToken>,
    config: Option<DisplayConfig>,
    /// Teardown requested while `Opening`; honoured once creation returns.
    pending: Option<TeardownCause>,
    opened_at: Option<DateTime<Utc>>,
    teardown: Option<TeardownCause>,
}

impl SessionCore {
    fn take_resources(&mut self) -> Resources {
        Resources {
            display_id: self.display_id.take(),
            token: self.token.take(),
        }
    }

    /// Enter `Released`, forgetting any display or token still referenced.
    fn mark_released(&mut self, cause: TeardownCause) {
        self.state = SessionState::Released;
        self.display_id = None;
        self.token = None;
        self.pending = None;
        self.teardown = Some(cause);
    }
}

/// State shared between a session and the callbacks registered for it.
pub(crate) struct SessionShared {
    id: SessionId,
    display: Proxy<dyn DisplayManager>,
    core: Mutex<SessionCore>,
    settled: Condvar,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    /// Apply one lifecycle event from the platform.
    pub(crate) fn handle_event(&self, event: LifecycleEvent) {
        let (resources, cause) = {
            let mut core = self.lock();
            match (core.state, event.teardown_cause()) {
                (SessionState::Active, None) if event == LifecycleEvent::Paused => {
                    core.state = SessionState::Paused;
                    tracing::info!(session = %self.id, display_id = ?core.display_id, "Display paused");
                    return;
                }
                (SessionState::Paused, None) if event == LifecycleEvent::Resumed => {
                    core.state = SessionState::Active;
                    tracing::info!(session = %self.id, display_id = ?core.display_id, "Display resumed");
                    return;
                }
                (SessionState::Active | SessionState::Paused, Some(cause)) => {
                    core.state = SessionState::Releasing;
                    (core.take_resources(), cause)
                }
                (SessionState::Opening, Some(cause)) => {
                    tracing::debug!(session = %self.id, ?event, "Deferring teardown until display creation returns");
                    core.pending.get_or_insert(cause);
                    return;
                }
                (state, _) => {
                    tracing::debug!(session = %self.id, %state, ?event, "Ignoring lifecycle event");
                    return;
                }
            }
        };

        if let Err(e) = self.teardown(resources, cause) {
            tracing::warn!(session = %self.id, %cause, error = %e, "Teardown after lifecycle event failed");
        }
    }

    /// Release the display, then stop the token, then settle in `Released`.
    ///
    /// Both steps run even if the first fails; the first failure is returned.
    /// Must be called without the session lock held.
    fn teardown(&self, resources: Resources, cause: TeardownCause) -> ProjectorResult<()> {
        let mut first_error = None;

        if let Some(display_id) = resources.display_id {
            let released = self
                .display
                .invoke("releaseVirtualDisplay", |d| d.release_virtual_display(display_id));
            if let Err(e) = released {
                tracing::warn!(session = %self.id, %display_id, error = %e, "Failed to release virtual display");
                first_error = Some(e);
            }
        }

        if let Some(token) = resources.token {
            token.unbind(self.id);
            if let Err(e) = token.stop() {
                tracing::warn!(session = %self.id, token = %token.id(), error = %e, "Failed to stop capability token");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        self.settle(cause);
        tracing::info!(session = %self.id, %cause, "Session released");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn settle(&self, cause: TeardownCause) {
        self.lock().mark_released(cause);
        self.settled.notify_all();
    }
}

/// Lifecycle of one remote virtual display bound to a capability token.
///
/// Commands block the calling thread; platform callbacks may arrive on any
/// thread. Dropping a session that still holds a display releases it.
pub struct VirtualDisplaySession {
    shared: Arc<SessionShared>,
    caller_package: String,
}

impl VirtualDisplaySession {
    pub fn new(display: Proxy<dyn DisplayManager>, caller_package: impl Into<String>) -> Self {
        let id = SessionId::next();
        tracing::debug!(session = %id, "Session created");
        Self {
            shared: Arc::new(SessionShared {
                id,
                display,
                core: Mutex::new(SessionCore {
                    state: SessionState::Idle,
                    display_id: None,
                    token: None,
                    config: None,
                    pending: None,
                    opened_at: None,
                    teardown: None,
                }),
                settled: Condvar::new(),
            }),
            caller_package: caller_package.into(),
        }
    }

    /// Create a session against the display service of `registry`.
    pub fn resolve(
        registry: &dyn ServiceRegistry,
        caller_package: impl Into<String>,
    ) -> ProjectorResult<Self> {
        Ok(Self::new(Proxy::resolve(registry)?, caller_package))
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Remote display id, present only while `Active` or `Paused`.
    pub fn display_id(&self) -> Option<DisplayId> {
        self.shared.lock().display_id
    }

    pub fn status(&self) -> SessionStatus {
        let core = self.shared.lock();
        let config = core.config.as_ref();
        SessionStatus {
            session_id: self.shared.id,
            state: core.state,
            display_id: core.display_id,
            token_id: core.token.as_ref().map(CapabilityToken::id),
            name: config.map(|c| c.name().to_string()),
            width: config.map(DisplayConfig::width),
            height: config.map(DisplayConfig::height),
            density: config.map(DisplayConfig::density),
            opened_at: core.opened_at,
            teardown: core.teardown,
        }
    }

    /// Create the remote display for `config`, bound to `token`.
    ///
    /// On a remote failure the session goes straight to `Released` and the
    /// token is unbound but left active. If a teardown was requested while the
    /// display was being created, the new display is released at once and
    /// `AlreadyReleased` is returned.
    pub fn open(&self, token: &CapabilityToken, config: DisplayConfig) -> ProjectorResult<DisplayId> {
        let id = self.shared.id;
        {
            let mut core = self.shared.lock();
            match core.state {
                SessionState::Idle => {}
                SessionState::Released => return Err(ProjectorError::AlreadyReleased),
                state => return Err(ProjectorError::invalid_state("open", state)),
            }

            let sink = LifecycleSink::new(&self.shared);
            token.bind(id, move || sink.deliver(LifecycleEvent::TokenRevoked))?;

            core.state = SessionState::Opening;
            core.token = Some(token.clone());
            core.config = Some(config.clone());
        }

        tracing::info!(
            session = %id,
            token = %token.id(),
            name = config.name(),
            width = config.width(),
            height = config.height(),
            density = config.density(),
            flags = %config.flags(),
            "Opening virtual display"
        );

        let callback: Arc<dyn VirtualDisplayCallback> = Arc::new(LifecycleSink::new(&self.shared));
        let projection = Arc::clone(token.projection());
        let created = self.shared.display.invoke("createVirtualDisplay", |d| {
            d.create_virtual_display(&config, callback, &projection, &self.caller_package)
        });

        let display_id = match created {
            Ok(display_id) => display_id,
            Err(e) => {
                token.unbind(id);
                self.shared.settle(TeardownCause::OpenFailed);
                tracing::warn!(session = %id, error = %e, "Virtual display creation failed");
                return Err(e);
            }
        };

        let deferred = {
            let mut core = self.shared.lock();
            core.display_id = Some(display_id);
            match core.pending.take() {
                Some(cause) => {
                    core.state = SessionState::Releasing;
                    Some((core.take_resources(), cause))
                }
                None => {
                    core.state = SessionState::Active;
                    core.opened_at = Some(Utc::now());
                    None
                }
            }
        };

        if let Some((resources, cause)) = deferred {
            tracing::info!(session = %id, %display_id, %cause, "Teardown requested during open; releasing new display");
            if let Err(e) = self.shared.teardown(resources, cause) {
                tracing::warn!(session = %id, error = %e, "Deferred teardown failed");
            }
            return Err(ProjectorError::AlreadyReleased);
        }

        self.shared.settled.notify_all();
        tracing::info!(session = %id, %display_id, "Virtual display active");
        Ok(display_id)
    }

    /// Release the session. Returns `Ok` if it is already released.
    ///
    /// While another transition is in flight this blocks until that
    /// transition has settled the session.
    pub fn release(&self) -> ProjectorResult<()> {
        let mut core = self.shared.lock();
        loop {
            match core.state {
                SessionState::Released => return Ok(()),
                SessionState::Idle => {
                    // Settled under the lock so a racing open() sees Released.
                    core.mark_released(TeardownCause::CallerRelease);
                    drop(core);
                    self.shared.settled.notify_all();
                    tracing::debug!(session = %self.shared.id, "Released idle session");
                    return Ok(());
                }
                SessionState::Opening => {
                    core.pending.get_or_insert(TeardownCause::CallerRelease);
                    core = self
                        .shared
                        .settled
                        .wait(core)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                SessionState::Releasing => {
                    core = self
                        .shared
                        .settled
                        .wait(core)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                SessionState::Active | SessionState::Paused => {
                    core.state = SessionState::Releasing;
                    let resources = core.take_resources();
                    drop(core);
                    tracing::info!(session = %self.shared.id, "Releasing session");
                    return self.shared.teardown(resources, TeardownCause::CallerRelease);
                }
            }
        }
    }

    /// Block until the session is `Released`.
    pub fn wait_released(&self) {
        let core = self.shared.lock();
        let _released = self
            .shared
            .settled
            .wait_while(core, |c| !c.state.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the session is `Released` or `timeout` elapses.
    ///
    /// Returns whether the session is released.
    pub fn wait_released_timeout(&self, timeout: Duration) -> bool {
        let core = self.shared.lock();
        let (core, _) = self
            .shared
            .settled
            .wait_timeout_while(core, timeout, |c| !c.state.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        core.state.is_terminal()
    }
}

impl fmt::Debug for VirtualDisplaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("VirtualDisplaySession")
            .field("id", &self.shared.id)
            .field("state", &core.state)
            .field("display_id", &core.display_id)
            .finish()
    }
}

impl Drop for VirtualDisplaySession {
    fn drop(&mut self) {
        let resources = {
            let mut core = self.shared.lock();
            match core.state {
                SessionState::Active | SessionState::Paused => {
                    core.state = SessionState::Releasing;
                    core.take_resources()
                }
                _ => return,
            }
        };

        tracing::warn!(session = %self.shared.id, "Session dropped while holding a display; releasing");
        if let Err(e) = self.shared.teardown(resources, TeardownCause::Dropped) {
            tracing::warn!(session = %self.shared.id, error = %e, "Teardown of dropped session failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_are_lowercase() {
        assert_eq!(SessionState::Releasing.to_string(), "releasing");
        assert_eq!(
            serde_json::to_string(&SessionState::Paused).unwrap(),
            "\"paused\""
        );
        assert_eq!(TeardownCause::TokenRevoked.to_string(), "token_revoked");
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert_eq!(format!("{a}"), format!("session#{}", a.get()));
    }
}
