//! In-process task service.

use std::sync::{Mutex, PoisonError};

use projector_common::error::{RemoteError, RemoteResult};
use projector_platform_core::{ActivityTaskManager, ComponentName, DisplayId, TaskFilter, TaskInfo};

use crate::fault::FaultPlan;

/// Task service serving a fixed, replaceable task list.
pub struct LoopbackTaskManager {
    tasks: Mutex<Vec<TaskInfo>>,
    faults: FaultPlan,
}

impl LoopbackTaskManager {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(seed_tasks()),
            faults: FaultPlan::default(),
        }
    }

    /// Replace the task list, most recent first.
    pub fn set_tasks(&self, tasks: Vec<TaskInfo>) {
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = tasks;
    }

    /// Fail the next `getTasks` call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.faults.arm("getTasks", error);
    }
}

fn seed_tasks() -> Vec<TaskInfo> {
    let task = |task_id, package: &str, class: &str, display_id, num_activities| TaskInfo {
        task_id,
        top_activity: Some(ComponentName::new(package, class)),
        display_id: DisplayId(display_id),
        num_activities,
    };
    vec![
        task(
            12,
            "com.android.settings",
            "com.android.settings.Settings",
            0,
            2,
        ),
        task(
            11,
            "com.android.launcher3",
            "com.android.launcher3.uioverrides.QuickstepLauncher",
            0,
            1,
        ),
        task(
            9,
            "com.android.systemui",
            "com.android.systemui.wallet.ui.WalletActivity",
            2,
            1,
        ),
    ]
}

impl ActivityTaskManager for LoopbackTaskManager {
    fn get_tasks(&self, max_count: usize, filter: &TaskFilter) -> RemoteResult<Vec<TaskInfo>> {
        self.faults.check("getTasks")?;

        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tasks
            .iter()
            .filter(|t| filter.display.map_or(true, |d| t.display_id == d))
            .take(max_count)
            .cloned()
            .collect())
    }
}
