//! Remote service availability report.
//!
//! Projector needs the display and projection services to create a virtual
//! display; task enumeration and app-op edits are optional extras.

use projector_platform_core::{
    ActivityTaskManager, AppOpsService, DisplayManager, Feature, PlatformFeatures,
    ProjectionManager, Proxy, RemoteInterface, ServiceName, ServiceRegistry,
};
use serde::Serialize;

/// A platform capability Projector may use.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check every remote service and the feature gates that matter to the CLI.
pub fn check_capabilities(
    registry: &dyn ServiceRegistry,
    features: PlatformFeatures,
) -> Vec<Capability> {
    vec![
        check_service::<dyn DisplayManager>(
            registry,
            "Display service",
            "Creates and releases virtual displays",
            true,
        ),
        check_service::<dyn ProjectionManager>(
            registry,
            "Projection service",
            "Issues screen capture authorizations",
            true,
        ),
        check_service::<dyn ActivityTaskManager>(
            registry,
            "Task service",
            "Enumerates running tasks",
            false,
        ),
        check_service::<dyn AppOpsService>(
            registry,
            "App-ops service",
            "Adjusts permission modes of the agent",
            false,
        ),
        check_feature(
            features,
            Feature::TrustedDisplays,
            "Trusted displays",
            "trusted and own_display_group display flags",
        ),
        check_feature(
            features,
            Feature::AlwaysUnlockedDisplays,
            "Always-unlocked displays",
            "always_unlocked display flag",
        ),
        check_feature(
            features,
            Feature::TaskDisplayFilter,
            "Per-display task filter",
            "Restricting task queries to one display",
        ),
    ]
}

fn check_service<I: ?Sized + RemoteInterface>(
    registry: &dyn ServiceRegistry,
    name: &str,
    description: &str,
    required: bool,
) -> Capability {
    let service: ServiceName = I::SERVICE;
    let available = Proxy::<I>::resolve(registry).is_ok();

    Capability {
        name: name.to_string(),
        description: description.to_string(),
        available,
        required,
        fix_instructions: if available {
            None
        } else {
            Some(format!(
                "Make sure the '{service}' service is registered and the agent runs with shell or system privileges"
            ))
        },
    }
}

fn check_feature(
    features: PlatformFeatures,
    feature: Feature,
    name: &str,
    description: &str,
) -> Capability {
    let available = features.supports(feature);

    Capability {
        name: name.to_string(),
        description: description.to_string(),
        available,
        required: false,
        fix_instructions: if available {
            None
        } else {
            Some(format!(
                "Needs API level {} (configured: {})",
                feature.min_api_level(),
                features.api_level()
            ))
        },
    }
}

/// Whether every required capability is available.
pub fn all_required_available(capabilities: &[Capability]) -> bool {
    capabilities.iter().all(|c| c.available || !c.required)
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Projector Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}
