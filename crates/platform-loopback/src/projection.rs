//! In-process projection service.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use projector_common::error::{RemoteError, RemoteResult};
use projector_platform_core::{
    ConsentGrant, MediaProjection, ProjectionCallback, ProjectionId, ProjectionManager,
};

use crate::dispatch::CallbackDispatcher;
use crate::display::LoopbackDisplayManager;
use crate::fault::FaultPlan;

/// Projections that have been created and not yet stopped.
#[derive(Debug, Default)]
pub(crate) struct ActiveProjections {
    ids: Mutex<HashSet<ProjectionId>>,
}

impl ActiveProjections {
    fn lock(&self) -> MutexGuard<'_, HashSet<ProjectionId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_active(&self, id: ProjectionId) -> bool {
        self.lock().contains(&id)
    }

    fn insert(&self, id: ProjectionId) {
        self.lock().insert(id);
    }

    /// Returns whether `id` was still active.
    fn remove(&self, id: ProjectionId) -> bool {
        self.lock().remove(&id)
    }
}

/// A call received by the projection service or one of its projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionCall {
    Create { uid: u32, package: String },
    Start(ProjectionId),
    Stop(ProjectionId),
}

/// State shared by the service and the projections it hands out.
struct Backend {
    dispatcher: Arc<CallbackDispatcher>,
    displays: Arc<LoopbackDisplayManager>,
    active: Arc<ActiveProjections>,
    faults: FaultPlan,
    calls: Mutex<Vec<ProjectionCall>>,
}

impl Backend {
    fn record(&self, call: ProjectionCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

/// Projection service with a switchable consent policy.
pub struct LoopbackProjectionManager {
    backend: Arc<Backend>,
    consent: AtomicBool,
    projections: Mutex<BTreeMap<ProjectionId, Arc<LoopbackProjection>>>,
}

impl LoopbackProjectionManager {
    pub(crate) fn new(
        dispatcher: Arc<CallbackDispatcher>,
        displays: Arc<LoopbackDisplayManager>,
        active: Arc<ActiveProjections>,
    ) -> Self {
        Self {
            backend: Arc::new(Backend {
                dispatcher,
                displays,
                active,
                faults: FaultPlan::default(),
                calls: Mutex::new(Vec::new()),
            }),
            consent: AtomicBool::new(true),
            projections: Mutex::new(BTreeMap::new()),
        }
    }

    /// Reject every subsequent consent grant.
    pub fn deny_consent(&self) {
        self.consent.store(false, Ordering::SeqCst);
    }

    pub fn allow_consent(&self) {
        self.consent.store(true, Ordering::SeqCst);
    }

    /// Fail the next call of `operation` (`createProjection`, `start` or
    /// `stop`) with `error`.
    pub fn fail_next(&self, operation: &'static str, error: RemoteError) {
        self.backend.faults.arm(operation, error);
    }

    pub fn calls(&self) -> Vec<ProjectionCall> {
        self.backend
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `stop` calls made by holders, across all projections.
    pub fn stop_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ProjectionCall::Stop(_)))
            .count()
    }

    pub fn projection(&self, id: ProjectionId) -> Option<Arc<LoopbackProjection>> {
        self.lock().get(&id).cloned()
    }

    pub fn is_active(&self, id: ProjectionId) -> bool {
        self.backend.active.is_active(id)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ProjectionId, Arc<LoopbackProjection>>> {
        self.projections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProjectionManager for LoopbackProjectionManager {
    fn create_projection(
        &self,
        uid: u32,
        package: &str,
        grant: &ConsentGrant,
    ) -> RemoteResult<Option<Arc<dyn MediaProjection>>> {
        self.backend.record(ProjectionCall::Create {
            uid,
            package: package.to_string(),
        });
        self.backend.faults.check("createProjection")?;

        if !grant.is_granted() || !self.consent.load(Ordering::SeqCst) {
            tracing::debug!(uid, package, "Loopback consent rejected");
            return Ok(None);
        }

        let mut projections = self.lock();
        let id = ProjectionId(projections.keys().next_back().map_or(1, |last| last.0 + 1));
        let projection = Arc::new(LoopbackProjection {
            id,
            uid,
            package: package.to_string(),
            backend: Arc::clone(&self.backend),
            callback: Mutex::new(None),
        });
        projections.insert(id, Arc::clone(&projection));
        self.backend.active.insert(id);

        tracing::debug!(projection = %id, uid, package, "Loopback projection created");
        Ok(Some(projection as Arc<dyn MediaProjection>))
    }
}

/// One projection handed out by [`LoopbackProjectionManager`].
pub struct LoopbackProjection {
    id: ProjectionId,
    uid: u32,
    package: String,
    backend: Arc<Backend>,
    callback: Mutex<Option<Arc<dyn ProjectionCallback>>>,
}

impl LoopbackProjection {
    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn is_active(&self) -> bool {
        self.backend.active.is_active(self.id)
    }

    /// User or OS withdraws the authorization.
    pub fn revoke(&self) -> bool {
        tracing::debug!(projection = %self.id, "Loopback projection revoked");
        self.end()
    }

    /// Stop displays created with this projection, then report the stop to
    /// the holder. Returns false if the projection had already ended.
    fn end(&self) -> bool {
        if !self.backend.active.remove(self.id) {
            return false;
        }
        self.backend.displays.stop_for_projection(self.id);

        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            self.backend.dispatcher.post(move || callback.on_stop());
        }
        true
    }
}

impl MediaProjection for LoopbackProjection {
    fn id(&self) -> ProjectionId {
        self.id
    }

    fn start(&self, callback: Arc<dyn ProjectionCallback>) -> RemoteResult<()> {
        self.backend.record(ProjectionCall::Start(self.id));
        self.backend.faults.check("start")?;

        if !self.is_active() {
            return Err(RemoteError::Exception(format!("{} already stopped", self.id)));
        }
        *self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
        Ok(())
    }

    fn stop(&self) -> RemoteResult<()> {
        self.backend.record(ProjectionCall::Stop(self.id));
        self.backend.faults.check("stop")?;

        if !self.end() {
            tracing::debug!(projection = %self.id, "Loopback projection already stopped");
        }
        Ok(())
    }
}
