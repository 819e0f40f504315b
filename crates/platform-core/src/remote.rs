//! Remote interface proxy.
//!
//! A [`ServiceRegistry`] resolves a [`ServiceName`] to a [`RemoteHandle`]; a
//! [`Proxy`] wraps the handle for one interface and funnels every call
//! through [`Proxy::invoke`], which attaches service/operation context to
//! failures. The proxy never retries and never swallows an error.
//!
//! # Flow
//!
//! 1. `Proxy::<dyn DisplayManager>::resolve(&registry)` looks up `display`
//! 2. `proxy.invoke("releaseVirtualDisplay", |d| d.release_virtual_display(id))`
//! 3. A `RemoteError` comes back as `ProjectorError::Remote { service, operation, .. }`

use std::fmt;
use std::sync::Arc;

use projector_common::error::{ProjectorError, ProjectorResult, RemoteResult};
use serde::{Deserialize, Serialize};

use crate::services::{ActivityTaskManager, AppOpsService, DisplayManager, ProjectionManager};

/// Well-known remote service names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    Display,
    MediaProjection,
    ActivityTask,
    AppOps,
}

impl ServiceName {
    pub const ALL: [ServiceName; 4] = [
        ServiceName::Display,
        ServiceName::MediaProjection,
        ServiceName::ActivityTask,
        ServiceName::AppOps,
    ];

    /// Name the platform registers the service under.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Display => "display",
            ServiceName::MediaProjection => "media_projection",
            ServiceName::ActivityTask => "activity_task",
            ServiceName::AppOps => "appops",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved reference to a remote service.
///
/// Shared with the IPC layer; clones are cheap and refer to the same object.
#[derive(Clone)]
pub enum RemoteHandle {
    Display(Arc<dyn DisplayManager>),
    MediaProjection(Arc<dyn ProjectionManager>),
    ActivityTask(Arc<dyn ActivityTaskManager>),
    AppOps(Arc<dyn AppOpsService>),
}

impl RemoteHandle {
    pub fn service(&self) -> ServiceName {
        match self {
            RemoteHandle::Display(_) => ServiceName::Display,
            RemoteHandle::MediaProjection(_) => ServiceName::MediaProjection,
            RemoteHandle::ActivityTask(_) => ServiceName::ActivityTask,
            RemoteHandle::AppOps(_) => ServiceName::AppOps,
        }
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteHandle").field(&self.service()).finish()
    }
}

/// Looks up remote services by name.
pub trait ServiceRegistry: Send + Sync {
    fn resolve(&self, name: ServiceName) -> Option<RemoteHandle>;
}

/// A remote interface that can be obtained from a [`RemoteHandle`].
pub trait RemoteInterface: Send + Sync + 'static {
    const SERVICE: ServiceName;

    fn from_handle(handle: RemoteHandle) -> Option<Arc<Self>>;
}

impl RemoteInterface for dyn DisplayManager {
    const SERVICE: ServiceName = ServiceName::Display;

    fn from_handle(handle: RemoteHandle) -> Option<Arc<Self>> {
        match handle {
            RemoteHandle::Display(inner) => Some(inner),
            _ => None,
        }
    }
}

impl RemoteInterface for dyn ProjectionManager {
    const SERVICE: ServiceName = ServiceName::MediaProjection;

    fn from_handle(handle: RemoteHandle) -> Option<Arc<Self>> {
        match handle {
            RemoteHandle::MediaProjection(inner) => Some(inner),
            _ => None,
        }
    }
}

impl RemoteInterface for dyn ActivityTaskManager {
    const SERVICE: ServiceName = ServiceName::ActivityTask;

    fn from_handle(handle: RemoteHandle) -> Option<Arc<Self>> {
        match handle {
            RemoteHandle::ActivityTask(inner) => Some(inner),
            _ => None,
        }
    }
}

impl RemoteInterface for dyn AppOpsService {
    const SERVICE: ServiceName = ServiceName::AppOps;

    fn from_handle(handle: RemoteHandle) -> Option<Arc<Self>> {
        match handle {
            RemoteHandle::AppOps(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Local handle to one remote interface.
pub struct Proxy<I: ?Sized + RemoteInterface> {
    inner: Arc<I>,
}

impl<I: ?Sized + RemoteInterface> Proxy<I> {
    /// Resolve the interface's service through `registry`.
    pub fn resolve(registry: &dyn ServiceRegistry) -> ProjectorResult<Self> {
        let handle = registry.resolve(I::SERVICE).ok_or_else(|| {
            tracing::debug!(service = %I::SERVICE, "Service not registered");
            ProjectorError::unavailable(I::SERVICE.as_str())
        })?;

        let kind = handle.service();
        let inner = I::from_handle(handle).ok_or_else(|| {
            tracing::warn!(
                service = %I::SERVICE,
                resolved = %kind,
                "Registry returned a handle of another interface"
            );
            ProjectorError::unavailable(I::SERVICE.as_str())
        })?;

        Ok(Self { inner })
    }

    /// Wrap an already obtained interface.
    pub fn from_interface(inner: Arc<I>) -> Self {
        Self { inner }
    }

    pub fn service(&self) -> ServiceName {
        I::SERVICE
    }

    /// Invoke one remote operation.
    pub fn invoke<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&I) -> RemoteResult<T>,
    ) -> ProjectorResult<T> {
        tracing::trace!(service = %I::SERVICE, operation, "Remote invoke");
        remote_call(I::SERVICE, operation, call(self.inner.as_ref()))
    }
}

/// Attach service/operation context to the outcome of a raw remote call.
///
/// Used for objects handed out by a service rather than resolved by name.
pub fn remote_call<T>(
    service: ServiceName,
    operation: &'static str,
    result: RemoteResult<T>,
) -> ProjectorResult<T> {
    result.map_err(|source| {
        tracing::debug!(%service, operation, error = %source, "Remote call failed");
        ProjectorError::Remote {
            service: service.as_str().to_string(),
            operation,
            source,
        }
    })
}

impl<I: ?Sized + RemoteInterface> Clone for Proxy<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: ?Sized + RemoteInterface> fmt::Debug for Proxy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("service", &I::SERVICE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{AppOpMode, TaskFilter, TaskInfo};
    use projector_common::error::RemoteError;

    struct FailingAppOps;

    impl AppOpsService for FailingAppOps {
        fn set_mode(&self, _: i32, _: u32, _: &str, _: AppOpMode) -> RemoteResult<()> {
            Err(RemoteError::TransportLost)
        }
    }

    struct EmptyTasks;

    impl ActivityTaskManager for EmptyTasks {
        fn get_tasks(&self, _: usize, _: &TaskFilter) -> RemoteResult<Vec<TaskInfo>> {
            Ok(Vec::new())
        }
    }

    struct OnlyAppOps;

    impl ServiceRegistry for OnlyAppOps {
        fn resolve(&self, name: ServiceName) -> Option<RemoteHandle> {
            match name {
                ServiceName::AppOps => Some(RemoteHandle::AppOps(Arc::new(FailingAppOps))),
                // Misregistered: answers the task name with the wrong interface.
                ServiceName::ActivityTask => Some(RemoteHandle::AppOps(Arc::new(FailingAppOps))),
                _ => None,
            }
        }
    }

    #[test]
    fn resolve_reports_missing_services() {
        let err = Proxy::<dyn DisplayManager>::resolve(&OnlyAppOps).unwrap_err();
        assert!(matches!(err, ProjectorError::Unavailable { ref service } if service == "display"));
    }

    #[test]
    fn resolve_rejects_handle_of_wrong_interface() {
        let err = Proxy::<dyn ActivityTaskManager>::resolve(&OnlyAppOps).unwrap_err();
        assert!(matches!(err, ProjectorError::Unavailable { .. }));
    }

    #[test]
    fn invoke_wraps_failures_with_context() {
        let proxy = Proxy::<dyn AppOpsService>::resolve(&OnlyAppOps).unwrap();
        let err = proxy
            .invoke("setMode", |ops| ops.set_mode(24, 10_000, "pkg", AppOpMode::Allowed))
            .unwrap_err();
        match err {
            ProjectorError::Remote {
                service,
                operation,
                source,
            } => {
                assert_eq!(service, "appops");
                assert_eq!(operation, "setMode");
                assert_eq!(source, RemoteError::TransportLost);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invoke_passes_results_through() {
        let tasks: Arc<dyn ActivityTaskManager> = Arc::new(EmptyTasks);
        let proxy = Proxy::from_interface(tasks);
        let result = proxy.invoke("getTasks", |t| t.get_tasks(5, &TaskFilter::default()));
        assert_eq!(result.unwrap(), Vec::new());
        assert_eq!(proxy.service(), ServiceName::ActivityTask);
    }
}
