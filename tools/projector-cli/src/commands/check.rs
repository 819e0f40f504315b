//! Check remote service availability.

use projector_common::config::AppConfig;
use projector_session::capabilities::{
    all_required_available, check_capabilities, print_capability_report,
};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Projector System Check");
    println!("{}", "=".repeat(50));

    let platform = super::platform(config)?;
    let features = platform.features();
    println!("[OK] API level: {}", features.api_level());
    println!("[OK] Caller package: {}", config.platform.caller_package);

    let capabilities = check_capabilities(&platform, features);
    println!();
    print_capability_report(&capabilities);

    println!();
    if all_required_available(&capabilities) {
        println!("All required capabilities are available. Projector is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
