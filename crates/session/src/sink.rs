//! Lifecycle callback sink.
//!
//! The platform reports display lifecycle changes on its own delivery thread.
//! A [`LifecycleSink`] turns each report into a [`LifecycleEvent`] and hands it
//! to the session it was created for. The sink only holds a weak reference,
//! so events for a session that has already been dropped are discarded.

use std::sync::{Arc, Weak};

use projector_platform_core::VirtualDisplayCallback;

use crate::session::{SessionId, SessionShared, TeardownCause};

/// Asynchronous lifecycle notification for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Paused,
    Resumed,
    Stopped,
    TokenRevoked,
}

impl LifecycleEvent {
    /// The teardown this event forces, if any.
    pub fn teardown_cause(&self) -> Option<TeardownCause> {
        match self {
            LifecycleEvent::Paused | LifecycleEvent::Resumed => None,
            LifecycleEvent::Stopped => Some(TeardownCause::DisplayStopped),
            LifecycleEvent::TokenRevoked => Some(TeardownCause::TokenRevoked),
        }
    }
}

/// Forwards platform callbacks to one session.
pub struct LifecycleSink {
    session_id: SessionId,
    session: Weak<SessionShared>,
}

impl LifecycleSink {
    pub(crate) fn new(session: &Arc<SessionShared>) -> Self {
        Self {
            session_id: session.id(),
            session: Arc::downgrade(session),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn deliver(&self, event: LifecycleEvent) {
        match self.session.upgrade() {
            Some(session) => session.handle_event(event),
            None => {
                tracing::debug!(session = %self.session_id, ?event, "Dropping event for a session that no longer exists");
            }
        }
    }
}

impl VirtualDisplayCallback for LifecycleSink {
    fn on_paused(&self) {
        self.deliver(LifecycleEvent::Paused);
    }

    fn on_resumed(&self) {
        self.deliver(LifecycleEvent::Resumed);
    }

    fn on_stopped(&self) {
        self.deliver(LifecycleEvent::Stopped);
    }
}
