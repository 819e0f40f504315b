//! Allow the agent's own app-ops.

use projector_common::config::AppConfig;
use projector_session::AppOpsController;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let platform = super::platform(config)?;
    let controller = AppOpsController::resolve(&platform, platform.features())?;

    let package = &config.platform.caller_package;
    println!("Allowing app-ops for {package} (uid {})", config.platform.uid);
    let report = controller.allow_self(config.platform.uid, package);

    for op in &report.granted {
        println!("  [OK]      {op}");
    }
    for op in &report.skipped {
        println!("  [SKIPPED] {op} (needs a newer API level)");
    }
    for (op, error) in &report.failed {
        println!("  [FAILED]  {op}: {error}");
    }

    if !report.is_complete() {
        anyhow::bail!("{} app-op(s) could not be allowed", report.failed.len());
    }
    Ok(())
}
