//! Projector Loopback Platform
//!
//! In-process implementations of every remote service contract:
//! - **Display:** virtual display table with injectable pause/resume/stop
//! - **Projection:** consent policy, start/stop and user revocation
//! - **Tasks / App-ops:** seeded task list and a mode table
//! - **Callbacks:** delivered on one dedicated thread, never on the caller's
//!
//! Every call is recorded and any operation can be made to fail once.

pub mod app_ops;
pub mod dispatch;
pub mod display;
pub mod fault;
pub mod projection;
pub mod tasks;

use std::collections::HashSet;
use std::sync::Arc;

use projector_common::error::ProjectorResult;
use projector_platform_core::{
    PlatformFeatures, ProjectionId, RemoteHandle, ServiceName, ServiceRegistry,
};

pub use app_ops::LoopbackAppOps;
pub use dispatch::CallbackDispatcher;
pub use display::{DisplayCall, DisplayRecord, LoopbackDisplayManager};
pub use projection::{LoopbackProjection, LoopbackProjectionManager, ProjectionCall};
pub use tasks::LoopbackTaskManager;

use projection::ActiveProjections;

/// A complete in-process platform.
pub struct LoopbackPlatform {
    features: PlatformFeatures,
    dispatcher: Arc<CallbackDispatcher>,
    display: Arc<LoopbackDisplayManager>,
    projection: Arc<LoopbackProjectionManager>,
    tasks: Arc<LoopbackTaskManager>,
    app_ops: Arc<LoopbackAppOps>,
    hidden: HashSet<ServiceName>,
}

impl LoopbackPlatform {
    pub fn new(features: PlatformFeatures) -> ProjectorResult<Self> {
        let dispatcher = Arc::new(CallbackDispatcher::new()?);
        let active = Arc::new(ActiveProjections::default());
        let display = Arc::new(LoopbackDisplayManager::new(
            Arc::clone(&dispatcher),
            Arc::clone(&active),
        ));
        let projection = Arc::new(LoopbackProjectionManager::new(
            Arc::clone(&dispatcher),
            Arc::clone(&display),
            active,
        ));

        tracing::debug!(api_level = features.api_level(), "Loopback platform started");
        Ok(Self {
            features,
            dispatcher,
            display,
            projection,
            tasks: Arc::new(LoopbackTaskManager::new()),
            app_ops: Arc::new(LoopbackAppOps::new(features)),
            hidden: HashSet::new(),
        })
    }

    /// Hide `service` from [`ServiceRegistry::resolve`].
    pub fn without(mut self, service: ServiceName) -> Self {
        self.hidden.insert(service);
        self
    }

    pub fn features(&self) -> PlatformFeatures {
        self.features
    }

    pub fn display(&self) -> &Arc<LoopbackDisplayManager> {
        &self.display
    }

    pub fn projection(&self) -> &Arc<LoopbackProjectionManager> {
        &self.projection
    }

    pub fn tasks(&self) -> &Arc<LoopbackTaskManager> {
        &self.tasks
    }

    pub fn app_ops(&self) -> &Arc<LoopbackAppOps> {
        &self.app_ops
    }

    /// User or OS revokes a projection. Returns false if it had already ended.
    pub fn revoke(&self, projection: ProjectionId) -> bool {
        self.projection
            .projection(projection)
            .is_some_and(|p| p.revoke())
    }

    /// Wait until every callback posted so far has been delivered.
    pub fn flush(&self) {
        self.dispatcher.flush();
    }
}

impl ServiceRegistry for LoopbackPlatform {
    fn resolve(&self, name: ServiceName) -> Option<RemoteHandle> {
        if self.hidden.contains(&name) {
            return None;
        }
        Some(match name {
            ServiceName::Display => RemoteHandle::Display(self.display.clone()),
            ServiceName::MediaProjection => RemoteHandle::MediaProjection(self.projection.clone()),
            ServiceName::ActivityTask => RemoteHandle::ActivityTask(self.tasks.clone()),
            ServiceName::AppOps => RemoteHandle::AppOps(self.app_ops.clone()),
        })
    }
}
