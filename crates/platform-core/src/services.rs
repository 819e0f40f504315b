//! Contracts of the hidden platform services.
//!
//! Each trait is the local view of one remote interface. Methods are
//! synchronous and block until the remote side answers; every failure is a
//! [`RemoteError`](projector_common::error::RemoteError).

use std::fmt;
use std::sync::Arc;

use projector_common::error::RemoteResult;
use serde::{Deserialize, Serialize};

use crate::display::{DisplayConfig, DisplayId};

/// Display service: creates and releases virtual displays.
pub trait DisplayManager: Send + Sync {
    fn create_virtual_display(
        &self,
        config: &DisplayConfig,
        callback: Arc<dyn VirtualDisplayCallback>,
        projection: &Arc<dyn MediaProjection>,
        caller_package: &str,
    ) -> RemoteResult<DisplayId>;

    fn release_virtual_display(&self, display_id: DisplayId) -> RemoteResult<()>;
}

/// Lifecycle notifications for one virtual display, delivered by the platform.
pub trait VirtualDisplayCallback: Send + Sync {
    fn on_paused(&self);
    fn on_resumed(&self);
    fn on_stopped(&self);
}

/// Identity of a projection on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectionId(pub u64);

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projection#{}", self.0)
    }
}

/// Proof of prior user/OS consent, as handed back by the consent flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentGrant {
    /// Result code of the consent flow; [`ConsentGrant::RESULT_OK`] means granted.
    pub result_code: i32,
    /// Opaque payload the projection service validates.
    pub payload: Vec<u8>,
}

impl ConsentGrant {
    pub const RESULT_OK: i32 = -1;
    pub const RESULT_CANCELED: i32 = 0;

    pub fn granted(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            result_code: Self::RESULT_OK,
            payload: payload.into(),
        }
    }

    pub fn canceled() -> Self {
        Self {
            result_code: Self::RESULT_CANCELED,
            payload: Vec::new(),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.result_code == Self::RESULT_OK
    }
}

/// Projection service: turns consent into a projection.
pub trait ProjectionManager: Send + Sync {
    /// Returns `None` when the grant is not accepted.
    fn create_projection(
        &self,
        uid: u32,
        package: &str,
        grant: &ConsentGrant,
    ) -> RemoteResult<Option<Arc<dyn MediaProjection>>>;
}

/// A screen-capture authorization held by the platform.
pub trait MediaProjection: Send + Sync {
    /// Identity, known locally without a remote call.
    fn id(&self) -> ProjectionId;

    fn start(&self, callback: Arc<dyn ProjectionCallback>) -> RemoteResult<()>;

    fn stop(&self) -> RemoteResult<()>;
}

/// Notification that a projection ended on the platform side.
pub trait ProjectionCallback: Send + Sync {
    fn on_stop(&self);
}

/// `package/class` of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

/// Snapshot of one running task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: i32,
    pub top_activity: Option<ComponentName>,
    pub display_id: DisplayId,
    pub num_activities: u32,
}

/// Optional filters of a task query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub filter_only_visible_recents: bool,
    pub keep_intent_extra: bool,
    /// Restrict to one display; `None` means all displays.
    pub display: Option<DisplayId>,
}

/// Task service.
pub trait ActivityTaskManager: Send + Sync {
    /// Most recent first, at most `max_count` entries.
    fn get_tasks(&self, max_count: usize, filter: &TaskFilter) -> RemoteResult<Vec<TaskInfo>>;
}

/// Mode of an app-op for one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppOpMode {
    Allowed,
    Ignored,
    Errored,
    Default,
    Foreground,
}

impl AppOpMode {
    pub fn code(&self) -> i32 {
        match self {
            AppOpMode::Allowed => 0,
            AppOpMode::Ignored => 1,
            AppOpMode::Errored => 2,
            AppOpMode::Default => 3,
            AppOpMode::Foreground => 4,
        }
    }
}

/// Permission-mode service.
pub trait AppOpsService: Send + Sync {
    fn set_mode(&self, op_code: i32, uid: u32, package: &str, mode: AppOpMode)
        -> RemoteResult<()>;
}
