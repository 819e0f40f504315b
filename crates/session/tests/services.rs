use projector_common::error::{ProjectorError, RemoteError};
use projector_platform_core::{AppOpMode, DisplayId, PlatformFeatures, ServiceName, TaskFilter};
use projector_platform_loopback::LoopbackPlatform;
use projector_session::capabilities::all_required_available;
use projector_session::{check_capabilities, AppOp, AppOpsController, TaskEnumerator};

const PACKAGE: &str = "dev.projector.agent";

fn platform_at(api_level: u32) -> LoopbackPlatform {
    LoopbackPlatform::new(PlatformFeatures::from_api_level(api_level))
        .expect("loopback platform should start")
}

#[test]
fn tasks_filtered_by_display_when_supported() {
    let platform = platform_at(34);
    let tasks = TaskEnumerator::resolve(&platform, platform.features()).unwrap();

    let all = tasks.running_tasks(10, &TaskFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].task_id, 12);

    let filter = TaskFilter {
        display: Some(DisplayId(2)),
        ..TaskFilter::default()
    };
    let on_virtual = tasks.running_tasks(10, &filter).unwrap();
    assert_eq!(on_virtual.len(), 1);
    assert_eq!(on_virtual[0].display_id, DisplayId(2));

    let top = tasks.top_activity().unwrap().unwrap();
    assert_eq!(top.package, "com.android.settings");
}

#[test]
fn task_query_failure_is_surfaced() {
    let platform = platform_at(34);
    let tasks = TaskEnumerator::resolve(&platform, platform.features()).unwrap();
    platform.tasks().fail_next(RemoteError::TransportLost);

    let err = tasks.running_tasks(5, &TaskFilter::default()).unwrap_err();
    assert!(matches!(
        err,
        ProjectorError::Remote {
            operation: "getTasks",
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[test]
fn allow_self_grants_what_the_platform_knows() {
    let platform = platform_at(33);
    let controller = AppOpsController::resolve(&platform, platform.features()).unwrap();

    let report = controller.allow_self(10_000, PACKAGE);

    assert!(report.is_complete());
    assert_eq!(
        report.skipped,
        vec![
            AppOp::ForegroundServiceSpecialUse,
            AppOp::CreateAccessibilityOverlay
        ]
    );
    assert_eq!(report.granted.len(), 6);
    assert_eq!(
        platform
            .app_ops()
            .mode(AppOp::AccessRestrictedSettings.code(), 10_000, PACKAGE),
        Some(AppOpMode::Allowed)
    );
}

#[test]
fn allow_self_records_failures_and_continues() {
    let platform = platform_at(34);
    let controller = AppOpsController::resolve(&platform, platform.features()).unwrap();
    platform
        .app_ops()
        .fail_next(RemoteError::Exception("SecurityException".to_string()));

    let report = controller.allow_self(10_000, PACKAGE);

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, AppOp::SELF_OPS[0]);
    assert_eq!(report.granted.len(), AppOp::SELF_OPS.len() - 1);
}

#[test]
fn missing_service_is_unavailable() {
    let platform = platform_at(34).without(ServiceName::AppOps);

    let err = AppOpsController::resolve(&platform, platform.features()).unwrap_err();
    assert!(matches!(err, ProjectorError::Unavailable { ref service } if service == "appops"));
}

#[test]
fn capability_report_flags_missing_required_services() {
    let full = platform_at(34);
    assert!(all_required_available(&check_capabilities(
        &full,
        full.features()
    )));

    let no_display = platform_at(29).without(ServiceName::Display);
    let report = check_capabilities(&no_display, no_display.features());
    assert!(!all_required_available(&report));

    let trusted = report
        .iter()
        .find(|c| c.name == "Trusted displays")
        .unwrap();
    assert!(!trusted.available);
    assert!(trusted.fix_instructions.as_deref().unwrap().contains("30"));
}
