//! Capability tokens: revocable screen-capture authorizations.
//!
//! A token wraps one remote projection. It is `Active` until it is stopped,
//! either by the holder ([`CapabilityToken::stop`]) or by the platform
//! (revocation), and it never becomes active again.
//!
//! The token has a single revocation-listener slot. Registering a listener
//! replaces the previous one; the listener runs only for platform-initiated
//! revocation, never for a holder-initiated stop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use projector_common::error::{ProjectorError, ProjectorResult};
use projector_platform_core::{
    remote_call, ConsentGrant, MediaProjection, ProjectionCallback, ProjectionId,
    ProjectionManager, Proxy, ServiceName,
};
use serde::Serialize;

use crate::session::SessionId;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TokenId(u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Stopped,
}

/// Prior consent presented when acquiring a token.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    uid: u32,
    package: String,
    grant: ConsentGrant,
}

impl AuthorizationContext {
    pub fn new(uid: u32, package: impl Into<String>, grant: ConsentGrant) -> Self {
        Self {
            uid,
            package: package.into(),
            grant,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }
}

type Listener = Box<dyn FnOnce() + Send>;

struct ListenerSlot {
    listener: Listener,
    /// Session that installed the listener through a bind, if any.
    owner: Option<SessionId>,
}

struct TokenCore {
    state: TokenState,
    listener: Option<ListenerSlot>,
    bound_to: Option<SessionId>,
}

struct TokenInner {
    id: TokenId,
    projection: Arc<dyn MediaProjection>,
    core: Mutex<TokenCore>,
}

impl TokenInner {
    fn lock(&self) -> MutexGuard<'_, TokenCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Platform-initiated transition to `Stopped`.
    fn revoke(&self) {
        let slot = {
            let mut core = self.lock();
            if core.state == TokenState::Stopped {
                tracing::debug!(token = %self.id, "Stop notification for an already stopped token");
                return;
            }
            core.state = TokenState::Stopped;
            core.listener.take()
        };

        tracing::info!(token = %self.id, projection = %self.projection.id(), "Capability token revoked by platform");
        if let Some(slot) = slot {
            (slot.listener)();
        }
    }
}

impl Drop for TokenInner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if core.state == TokenState::Active {
            core.state = TokenState::Stopped;
            tracing::warn!(token = %self.id, "Capability token dropped while active; stopping projection");
            if let Err(e) = self.projection.stop() {
                tracing::warn!(token = %self.id, error = %e, "Failed to stop projection of dropped token");
            }
        }
    }
}

/// Receives the platform's stop notification for one projection.
struct RevocationCallback {
    token: Weak<TokenInner>,
}

impl ProjectionCallback for RevocationCallback {
    fn on_stop(&self) {
        if let Some(token) = self.token.upgrade() {
            token.revoke();
        }
    }
}

/// Handle to a screen-capture authorization.
///
/// Clones share the same state; the last clone to go away stops an
/// authorization that is still active.
#[derive(Clone)]
pub struct CapabilityToken {
    inner: Arc<TokenInner>,
}

impl CapabilityToken {
    /// Obtain a token from the projection service.
    ///
    /// Fails with `Denied` when the context carries no consent or the service
    /// rejects it.
    pub fn acquire(
        manager: &Proxy<dyn ProjectionManager>,
        context: &AuthorizationContext,
    ) -> ProjectorResult<Self> {
        if !context.grant.is_granted() {
            tracing::warn!(
                package = %context.package,
                result_code = context.grant.result_code,
                "Screen capture consent was not granted"
            );
            return Err(ProjectorError::denied("screen capture consent was not granted"));
        }

        let projection = manager
            .invoke("createProjection", |m| {
                m.create_projection(context.uid, &context.package, &context.grant)
            })?
            .ok_or_else(|| {
                tracing::warn!(package = %context.package, "Projection service rejected the consent grant");
                ProjectorError::denied("projection service rejected the consent grant")
            })?;

        let token = Self {
            inner: Arc::new(TokenInner {
                id: TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)),
                projection,
                core: Mutex::new(TokenCore {
                    state: TokenState::Active,
                    listener: None,
                    bound_to: None,
                }),
            }),
        };

        let callback = Arc::new(RevocationCallback {
            token: Arc::downgrade(&token.inner),
        });
        let started = remote_call(
            ServiceName::MediaProjection,
            "start",
            token.inner.projection.start(callback),
        );
        if let Err(e) = started {
            if let Err(stop_err) = token.stop() {
                tracing::warn!(token = %token.id(), error = %stop_err, "Failed to stop projection that never started");
            }
            return Err(e);
        }

        tracing::info!(
            token = %token.id(),
            projection = %token.inner.projection.id(),
            package = %context.package,
            "Capability token acquired"
        );
        Ok(token)
    }

    pub fn id(&self) -> TokenId {
        self.inner.id
    }

    pub fn projection_id(&self) -> ProjectionId {
        self.inner.projection.id()
    }

    pub fn state(&self) -> TokenState {
        self.inner.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == TokenState::Active
    }

    /// Session currently bound to this token.
    pub fn bound_session(&self) -> Option<SessionId> {
        self.inner.lock().bound_to
    }

    /// Install the revocation listener, replacing any previous one.
    ///
    /// The slot holds exactly one listener: the last registration wins. This
    /// includes the listener a bound session installed for itself; once
    /// evicted, that session only learns of a revocation through its
    /// display's stop callback.
    pub fn register_revocation_listener(&self, listener: impl FnOnce() + Send + 'static) {
        let mut core = self.inner.lock();
        if core.state == TokenState::Stopped {
            tracing::debug!(token = %self.inner.id, "Listener registered on a stopped token will never run");
            return;
        }
        let previous = core.listener.replace(ListenerSlot {
            listener: Box::new(listener),
            owner: None,
        });
        match previous.and_then(|slot| slot.owner) {
            Some(session) => tracing::warn!(
                token = %self.inner.id,
                %session,
                "Replaced the revocation listener of a bound session"
            ),
            None => tracing::debug!(token = %self.inner.id, "Installed revocation listener"),
        }
    }

    /// Stop the authorization. A no-op when already stopped.
    ///
    /// Does not run the revocation listener. A failing remote stop is
    /// returned, but the token stays stopped.
    pub fn stop(&self) -> ProjectorResult<()> {
        {
            let mut core = self.inner.lock();
            if core.state == TokenState::Stopped {
                tracing::debug!(token = %self.inner.id, "Token already stopped");
                return Ok(());
            }
            core.state = TokenState::Stopped;
            core.listener = None;
        }

        tracing::info!(token = %self.inner.id, "Stopping capability token");
        remote_call(
            ServiceName::MediaProjection,
            "stop",
            self.inner.projection.stop(),
        )
    }

    /// Bind `session` to this token and install its revocation listener.
    pub(crate) fn bind(
        &self,
        session: SessionId,
        listener: impl FnOnce() + Send + 'static,
    ) -> ProjectorResult<()> {
        let mut core = self.inner.lock();
        if core.state == TokenState::Stopped {
            return Err(ProjectorError::TokenStopped);
        }
        if let Some(other) = core.bound_to {
            if other != session {
                tracing::warn!(token = %self.inner.id, bound = %other, rejected = %session, "Token already bound");
                return Err(ProjectorError::TokenConflict { session: other.0 });
            }
        }
        core.bound_to = Some(session);
        core.listener = Some(ListenerSlot {
            listener: Box::new(listener),
            owner: Some(session),
        });
        tracing::debug!(token = %self.inner.id, %session, "Token bound to session");
        Ok(())
    }

    /// Undo [`bind`](Self::bind); leaves a listener registered by someone else alone.
    pub(crate) fn unbind(&self, session: SessionId) {
        let mut core = self.inner.lock();
        if core.bound_to == Some(session) {
            core.bound_to = None;
        }
        if core
            .listener
            .as_ref()
            .is_some_and(|slot| slot.owner == Some(session))
        {
            core.listener = None;
        }
    }

    pub(crate) fn projection(&self) -> &Arc<dyn MediaProjection> {
        &self.inner.projection
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("CapabilityToken")
            .field("id", &self.inner.id)
            .field("state", &core.state)
            .field("bound_to", &core.bound_to)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projector_common::error::{RemoteError, RemoteResult};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeProjection {
        stops: AtomicUsize,
        callback: Mutex<Option<Arc<dyn ProjectionCallback>>>,
        fail_start: bool,
    }

    impl FakeProjection {
        fn platform_stop(&self) {
            let callback = self.callback.lock().unwrap().clone();
            if let Some(callback) = callback {
                callback.on_stop();
            }
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    impl MediaProjection for FakeProjection {
        fn id(&self) -> ProjectionId {
            ProjectionId(1)
        }

        fn start(&self, callback: Arc<dyn ProjectionCallback>) -> RemoteResult<()> {
            if self.fail_start {
                return Err(RemoteError::Exception("start refused".to_string()));
            }
            *self.callback.lock().unwrap() = Some(callback);
            Ok(())
        }

        fn stop(&self) -> RemoteResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeManager {
        projection: Option<Arc<FakeProjection>>,
    }

    impl ProjectionManager for FakeManager {
        fn create_projection(
            &self,
            _uid: u32,
            _package: &str,
            _grant: &ConsentGrant,
        ) -> RemoteResult<Option<Arc<dyn MediaProjection>>> {
            Ok(self
                .projection
                .clone()
                .map(|p| p as Arc<dyn MediaProjection>))
        }
    }

    fn acquire_with(projection: &Arc<FakeProjection>) -> ProjectorResult<CapabilityToken> {
        let manager: Arc<dyn ProjectionManager> = Arc::new(FakeManager {
            projection: Some(Arc::clone(projection)),
        });
        CapabilityToken::acquire(
            &Proxy::from_interface(manager),
            &AuthorizationContext::new(10_000, "pkg", ConsentGrant::granted(vec![1])),
        )
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (count, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn denied_without_consent_and_makes_no_remote_call() {
        let manager: Arc<dyn ProjectionManager> = Arc::new(FakeManager { projection: None });
        let proxy = Proxy::from_interface(manager);

        let canceled = AuthorizationContext::new(10_000, "pkg", ConsentGrant::canceled());
        assert!(matches!(
            CapabilityToken::acquire(&proxy, &canceled),
            Err(ProjectorError::Denied { .. })
        ));

        let rejected = AuthorizationContext::new(10_000, "pkg", ConsentGrant::granted(vec![]));
        assert!(matches!(
            CapabilityToken::acquire(&proxy, &rejected),
            Err(ProjectorError::Denied { .. })
        ));
    }

    #[test]
    fn failed_start_stops_the_projection() {
        let projection = Arc::new(FakeProjection {
            fail_start: true,
            ..FakeProjection::default()
        });
        let err = acquire_with(&projection).unwrap_err();
        assert!(matches!(err, ProjectorError::Remote { operation: "start", .. }));
        assert_eq!(projection.stops(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_skips_listener() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();
        let (fired, listener) = counter();
        token.register_revocation_listener(listener);

        token.stop().unwrap();
        token.stop().unwrap();
        projection.platform_stop();

        assert_eq!(token.state(), TokenState::Stopped);
        assert_eq!(projection.stops(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn revocation_fires_listener_exactly_once() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();
        let (fired, listener) = counter();
        token.register_revocation_listener(listener);

        projection.platform_stop();
        projection.platform_stop();
        token.stop().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!token.is_active());
        assert_eq!(projection.stops(), 0);
    }

    #[test]
    fn second_listener_replaces_first() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();
        let (first, first_listener) = counter();
        let (second, second_listener) = counter();

        token.register_revocation_listener(first_listener);
        token.register_revocation_listener(second_listener);
        projection.platform_stop();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registration_evicts_bound_session_listener() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();
        let (session_fired, session_listener) = counter();
        let (caller_fired, caller_listener) = counter();

        token.bind(SessionId(3), session_listener).unwrap();
        token.register_revocation_listener(caller_listener);
        projection.platform_stop();

        assert_eq!(session_fired.load(Ordering::SeqCst), 0);
        assert_eq!(caller_fired.load(Ordering::SeqCst), 1);
        assert_eq!(token.bound_session(), Some(SessionId(3)));
    }

    #[test]
    fn bind_enforces_single_session_and_active_state() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();

        token.bind(SessionId(1), || {}).unwrap();
        assert!(matches!(
            token.bind(SessionId(2), || {}),
            Err(ProjectorError::TokenConflict { session: 1 })
        ));
        assert_eq!(token.bound_session(), Some(SessionId(1)));

        token.unbind(SessionId(1));
        token.bind(SessionId(2), || {}).unwrap();

        token.stop().unwrap();
        token.unbind(SessionId(2));
        assert!(matches!(
            token.bind(SessionId(3), || {}),
            Err(ProjectorError::TokenStopped)
        ));
    }

    #[test]
    fn unbind_keeps_foreign_listener() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();
        let (fired, listener) = counter();

        token.bind(SessionId(7), || {}).unwrap();
        token.register_revocation_listener(listener);
        token.unbind(SessionId(7));
        projection.platform_stop();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_active_token_stops_projection() {
        let projection = Arc::new(FakeProjection::default());
        let token = acquire_with(&projection).unwrap();
        let clone = token.clone();

        drop(token);
        assert_eq!(projection.stops(), 0);
        drop(clone);
        assert_eq!(projection.stops(), 1);
    }
}
