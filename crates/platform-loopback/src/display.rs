//! In-process display service.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use projector_common::error::{RemoteError, RemoteResult};
use projector_platform_core::{
    DisplayConfig, DisplayId, DisplayManager, MediaProjection, ProjectionId,
    VirtualDisplayCallback,
};

use crate::dispatch::CallbackDispatcher;
use crate::fault::FaultPlan;
use crate::projection::ActiveProjections;

/// First id handed out; 0 is the built-in display and 1 is reserved.
const FIRST_VIRTUAL_DISPLAY_ID: i32 = 2;

/// A call received by the display service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCall {
    Create {
        name: String,
        projection: ProjectionId,
        caller_package: String,
    },
    Release(DisplayId),
}

/// A display known to the service.
#[derive(Clone)]
pub struct DisplayRecord {
    pub config: DisplayConfig,
    pub projection: ProjectionId,
    pub caller_package: String,
    pub paused: bool,
    /// Stopped by the platform but not yet released by the caller.
    pub stopped: bool,
    callback: Arc<dyn VirtualDisplayCallback>,
}

impl std::fmt::Debug for DisplayRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayRecord")
            .field("name", &self.config.name())
            .field("projection", &self.projection)
            .field("paused", &self.paused)
            .field("stopped", &self.stopped)
            .finish()
    }
}

struct DisplayTable {
    next_id: i32,
    displays: BTreeMap<DisplayId, DisplayRecord>,
    calls: Vec<DisplayCall>,
}

/// Display service backed by an in-memory table.
pub struct LoopbackDisplayManager {
    dispatcher: Arc<CallbackDispatcher>,
    projections: Arc<ActiveProjections>,
    faults: FaultPlan,
    table: Mutex<DisplayTable>,
}

impl LoopbackDisplayManager {
    pub(crate) fn new(
        dispatcher: Arc<CallbackDispatcher>,
        projections: Arc<ActiveProjections>,
    ) -> Self {
        Self {
            dispatcher,
            projections,
            faults: FaultPlan::default(),
            table: Mutex::new(DisplayTable {
                next_id: FIRST_VIRTUAL_DISPLAY_ID,
                displays: BTreeMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next call of `operation` (`createVirtualDisplay` or
    /// `releaseVirtualDisplay`) with `error`.
    pub fn fail_next(&self, operation: &'static str, error: RemoteError) {
        self.faults.arm(operation, error);
    }

    pub fn calls(&self) -> Vec<DisplayCall> {
        self.lock().calls.clone()
    }

    pub fn create_count(&self) -> usize {
        self.count(|c| matches!(c, DisplayCall::Create { .. }))
    }

    pub fn release_count(&self) -> usize {
        self.count(|c| matches!(c, DisplayCall::Release(_)))
    }

    fn count(&self, pred: impl Fn(&DisplayCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(*c)).count()
    }

    /// Displays created and not yet released.
    pub fn live_displays(&self) -> Vec<DisplayId> {
        self.lock().displays.keys().copied().collect()
    }

    pub fn display(&self, display_id: DisplayId) -> Option<DisplayRecord> {
        self.lock().displays.get(&display_id).cloned()
    }

    /// Platform pauses rendering of a display.
    pub fn pause(&self, display_id: DisplayId) -> bool {
        self.notify(
            display_id,
            |r| !std::mem::replace(&mut r.paused, true),
            |cb| cb.on_paused(),
        )
    }

    /// Platform resumes rendering of a paused display.
    pub fn resume(&self, display_id: DisplayId) -> bool {
        self.notify(
            display_id,
            |r| std::mem::replace(&mut r.paused, false),
            |cb| cb.on_resumed(),
        )
    }

    /// Platform stops a display. It stays allocated until released.
    pub fn stop(&self, display_id: DisplayId) -> bool {
        self.notify(
            display_id,
            |r| {
                r.stopped = true;
                true
            },
            |cb| cb.on_stopped(),
        )
    }

    /// Stop every display created with `projection`.
    pub(crate) fn stop_for_projection(&self, projection: ProjectionId) {
        let callbacks: Vec<_> = {
            let mut table = self.lock();
            table
                .displays
                .iter_mut()
                .filter(|(_, r)| r.projection == projection && !r.stopped)
                .map(|(id, r)| {
                    r.stopped = true;
                    (*id, Arc::clone(&r.callback))
                })
                .collect()
        };
        for (display_id, callback) in callbacks {
            tracing::debug!(%display_id, %projection, "Stopping display of ended projection");
            self.dispatcher.post(move || callback.on_stopped());
        }
    }

    fn notify(
        &self,
        display_id: DisplayId,
        update: impl FnOnce(&mut DisplayRecord) -> bool,
        deliver: impl FnOnce(&dyn VirtualDisplayCallback) + Send + 'static,
    ) -> bool {
        let callback = {
            let mut table = self.lock();
            let Some(record) = table.displays.get_mut(&display_id) else {
                tracing::debug!(%display_id, "No such display");
                return false;
            };
            if record.stopped || !update(record) {
                return false;
            }
            Arc::clone(&record.callback)
        };
        self.dispatcher.post(move || deliver(callback.as_ref()));
        true
    }
}

impl DisplayManager for LoopbackDisplayManager {
    fn create_virtual_display(
        &self,
        config: &DisplayConfig,
        callback: Arc<dyn VirtualDisplayCallback>,
        projection: &Arc<dyn MediaProjection>,
        caller_package: &str,
    ) -> RemoteResult<DisplayId> {
        let projection_id = projection.id();
        let mut table = self.lock();
        table.calls.push(DisplayCall::Create {
            name: config.name().to_string(),
            projection: projection_id,
            caller_package: caller_package.to_string(),
        });
        self.faults.check("createVirtualDisplay")?;

        if !self.projections.is_active(projection_id) {
            return Err(RemoteError::Exception(format!(
                "{projection_id} is not active"
            )));
        }

        let display_id = DisplayId(table.next_id);
        table.next_id += 1;
        table.displays.insert(
            display_id,
            DisplayRecord {
                config: config.clone(),
                projection: projection_id,
                caller_package: caller_package.to_string(),
                paused: false,
                stopped: false,
                callback,
            },
        );
        tracing::debug!(%display_id, name = config.name(), "Loopback display created");
        Ok(display_id)
    }

    fn release_virtual_display(&self, display_id: DisplayId) -> RemoteResult<()> {
        let mut table = self.lock();
        table.calls.push(DisplayCall::Release(display_id));
        self.faults.check("releaseVirtualDisplay")?;

        match table.displays.remove(&display_id) {
            Some(_) => {
                tracing::debug!(%display_id, "Loopback display released");
                Ok(())
            }
            None => Err(RemoteError::Exception(format!(
                "unknown display {display_id}"
            ))),
        }
    }
}
