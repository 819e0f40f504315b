//! List running tasks.

use projector_common::config::AppConfig;
use projector_platform_core::{DisplayId, TaskFilter};
use projector_session::TaskEnumerator;

pub fn run(config: &AppConfig, max: usize, display: Option<i32>) -> anyhow::Result<()> {
    let platform = super::platform(config)?;
    let tasks = TaskEnumerator::resolve(&platform, platform.features())?;

    let filter = TaskFilter {
        display: display.map(DisplayId),
        ..TaskFilter::default()
    };
    let running = tasks.running_tasks(max, &filter)?;

    if running.is_empty() {
        println!("No running tasks.");
        return Ok(());
    }

    println!("{:>6}  {:>7}  {:>10}  TOP ACTIVITY", "TASK", "DISPLAY", "ACTIVITIES");
    for task in &running {
        let top = task
            .top_activity
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:>7}  {:>10}  {}",
            task.task_id, task.display_id, task.num_activities, top
        );
    }

    Ok(())
}
