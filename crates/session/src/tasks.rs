//! Running task enumeration.

use projector_common::error::ProjectorResult;
use projector_platform_core::{
    ActivityTaskManager, ComponentName, Feature, PlatformFeatures, Proxy, ServiceRegistry,
    TaskFilter, TaskInfo,
};

/// Read-only view of the platform's running tasks.
#[derive(Debug, Clone)]
pub struct TaskEnumerator {
    proxy: Proxy<dyn ActivityTaskManager>,
    features: PlatformFeatures,
}

impl TaskEnumerator {
    pub fn new(proxy: Proxy<dyn ActivityTaskManager>, features: PlatformFeatures) -> Self {
        Self { proxy, features }
    }

    pub fn resolve(
        registry: &dyn ServiceRegistry,
        features: PlatformFeatures,
    ) -> ProjectorResult<Self> {
        Ok(Self::new(Proxy::resolve(registry)?, features))
    }

    /// Running tasks, most recent first, at most `max_count`.
    ///
    /// A display filter is only forwarded when the platform supports it;
    /// otherwise tasks from every display are returned.
    pub fn running_tasks(
        &self,
        max_count: usize,
        filter: &TaskFilter,
    ) -> ProjectorResult<Vec<TaskInfo>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let mut effective = filter.clone();
        if effective.display.is_some() && !self.features.supports(Feature::TaskDisplayFilter) {
            tracing::debug!(
                api_level = self.features.api_level(),
                display = ?effective.display,
                "Display filter unsupported; querying all displays"
            );
            effective.display = None;
        }

        let mut tasks = self
            .proxy
            .invoke("getTasks", |t| t.get_tasks(max_count, &effective))?;
        tasks.truncate(max_count);
        tracing::debug!(count = tasks.len(), max_count, "Enumerated running tasks");
        Ok(tasks)
    }

    /// Top activity of the most recent task, if any.
    pub fn top_activity(&self) -> ProjectorResult<Option<ComponentName>> {
        let tasks = self.running_tasks(1, &TaskFilter::default())?;
        Ok(tasks.into_iter().next().and_then(|t| t.top_activity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projector_common::error::RemoteResult;
    use projector_platform_core::DisplayId;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingTasks {
        filters: Mutex<Vec<TaskFilter>>,
    }

    impl ActivityTaskManager for RecordingTasks {
        fn get_tasks(&self, max_count: usize, filter: &TaskFilter) -> RemoteResult<Vec<TaskInfo>> {
            self.filters.lock().unwrap().push(filter.clone());
            Ok((0..max_count as i32 + 2)
                .map(|i| TaskInfo {
                    task_id: 100 + i,
                    top_activity: Some(ComponentName::new("pkg", format!("Activity{i}"))),
                    display_id: DisplayId::DEFAULT,
                    num_activities: 1,
                })
                .collect())
        }
    }

    fn enumerator(api_level: u32) -> (Arc<RecordingTasks>, TaskEnumerator) {
        let tasks = Arc::new(RecordingTasks::default());
        let proxy = Proxy::from_interface(tasks.clone() as Arc<dyn ActivityTaskManager>);
        (
            tasks,
            TaskEnumerator::new(proxy, PlatformFeatures::from_api_level(api_level)),
        )
    }

    #[test]
    fn display_filter_dropped_on_old_platforms() {
        let filter = TaskFilter {
            display: Some(DisplayId(3)),
            ..TaskFilter::default()
        };

        let (old_tasks, old) = enumerator(28);
        old.running_tasks(3, &filter).unwrap();
        assert_eq!(old_tasks.filters.lock().unwrap()[0].display, None);

        let (new_tasks, new) = enumerator(29);
        new.running_tasks(3, &filter).unwrap();
        assert_eq!(new_tasks.filters.lock().unwrap()[0].display, Some(DisplayId(3)));
    }

    #[test]
    fn result_is_capped_and_zero_skips_remote_call() {
        let (tasks, enumerator) = enumerator(34);
        assert_eq!(enumerator.running_tasks(2, &TaskFilter::default()).unwrap().len(), 2);
        assert!(enumerator.running_tasks(0, &TaskFilter::default()).unwrap().is_empty());
        assert_eq!(tasks.filters.lock().unwrap().len(), 1);
    }

    #[test]
    fn top_activity_is_first_task() {
        let (_, enumerator) = enumerator(34);
        let top = enumerator.top_activity().unwrap().unwrap();
        assert_eq!(top.to_string(), "pkg/Activity0");
    }
}
