pub mod check;
pub mod config;
pub mod grant_ops;
pub mod open;
pub mod tasks;

use projector_common::config::AppConfig;
use projector_platform_core::PlatformFeatures;
use projector_platform_loopback::LoopbackPlatform;

/// Start the platform the commands talk to.
pub fn platform(config: &AppConfig) -> anyhow::Result<LoopbackPlatform> {
    let features = PlatformFeatures::from(&config.platform);
    Ok(LoopbackPlatform::new(features)?)
}
