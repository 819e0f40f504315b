//! Permission-mode (app-op) edits.

use std::fmt;

use projector_common::error::ProjectorResult;
use projector_platform_core::{
    AppOpMode, AppOpsService, Feature, PlatformFeatures, Proxy, ServiceRegistry,
};
use serde::Serialize;

/// App-ops the agent grants itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppOp {
    PostNotification,
    CallPhone,
    SystemAlertWindow,
    ReadPhoneState,
    AccessAccessibility,
    AccessRestrictedSettings,
    ForegroundServiceSpecialUse,
    CreateAccessibilityOverlay,
}

impl AppOp {
    pub const SELF_OPS: [AppOp; 8] = [
        AppOp::PostNotification,
        AppOp::SystemAlertWindow,
        AppOp::CallPhone,
        AppOp::ReadPhoneState,
        AppOp::AccessAccessibility,
        AppOp::AccessRestrictedSettings,
        AppOp::ForegroundServiceSpecialUse,
        AppOp::CreateAccessibilityOverlay,
    ];

    /// Numeric op code understood by the app-ops service.
    pub fn code(&self) -> i32 {
        match self {
            AppOp::PostNotification => 11,
            AppOp::CallPhone => 13,
            AppOp::SystemAlertWindow => 24,
            AppOp::ReadPhoneState => 51,
            AppOp::AccessAccessibility => 88,
            AppOp::AccessRestrictedSettings => 119,
            AppOp::ForegroundServiceSpecialUse => 127,
            AppOp::CreateAccessibilityOverlay => 138,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AppOp::PostNotification => "OP_POST_NOTIFICATION",
            AppOp::CallPhone => "OP_CALL_PHONE",
            AppOp::SystemAlertWindow => "OP_SYSTEM_ALERT_WINDOW",
            AppOp::ReadPhoneState => "OP_READ_PHONE_STATE",
            AppOp::AccessAccessibility => "OP_ACCESS_ACCESSIBILITY",
            AppOp::AccessRestrictedSettings => "OP_ACCESS_RESTRICTED_SETTINGS",
            AppOp::ForegroundServiceSpecialUse => "OP_FOREGROUND_SERVICE_SPECIAL_USE",
            AppOp::CreateAccessibilityOverlay => "OP_CREATE_ACCESSIBILITY_OVERLAY",
        }
    }

    /// Feature the op depends on; `None` for ops present on every platform.
    pub fn required_feature(&self) -> Option<Feature> {
        match self {
            AppOp::PostNotification
            | AppOp::CallPhone
            | AppOp::SystemAlertWindow
            | AppOp::ReadPhoneState => None,
            AppOp::AccessAccessibility => Some(Feature::AccessibilityOp),
            AppOp::AccessRestrictedSettings => Some(Feature::RestrictedSettingsOp),
            AppOp::ForegroundServiceSpecialUse => Some(Feature::ForegroundServiceSpecialUseOp),
            AppOp::CreateAccessibilityOverlay => Some(Feature::AccessibilityOverlayOp),
        }
    }

    pub fn is_supported(&self, features: PlatformFeatures) -> bool {
        self.required_feature()
            .map_or(true, |feature| features.supports(feature))
    }
}

impl fmt::Display for AppOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of [`AppOpsController::allow_self`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct GrantReport {
    pub granted: Vec<AppOp>,
    /// Not available at the configured API level.
    pub skipped: Vec<AppOp>,
    pub failed: Vec<(AppOp, String)>,
}

impl GrantReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Wrapper over the app-ops service.
#[derive(Debug, Clone)]
pub struct AppOpsController {
    proxy: Proxy<dyn AppOpsService>,
    features: PlatformFeatures,
}

impl AppOpsController {
    pub fn new(proxy: Proxy<dyn AppOpsService>, features: PlatformFeatures) -> Self {
        Self { proxy, features }
    }

    pub fn resolve(
        registry: &dyn ServiceRegistry,
        features: PlatformFeatures,
    ) -> ProjectorResult<Self> {
        Ok(Self::new(Proxy::resolve(registry)?, features))
    }

    pub fn set_mode(
        &self,
        op_code: i32,
        uid: u32,
        package: &str,
        mode: AppOpMode,
    ) -> ProjectorResult<()> {
        self.proxy
            .invoke("setMode", |ops| ops.set_mode(op_code, uid, package, mode))?;
        tracing::debug!(op_code, uid, package, ?mode, "App-op mode set");
        Ok(())
    }

    /// Allow every self-op the platform supports for `package`.
    ///
    /// A failing op is recorded in the report and does not stop the others.
    pub fn allow_self(&self, uid: u32, package: &str) -> GrantReport {
        let mut report = GrantReport::default();

        for op in AppOp::SELF_OPS {
            if !op.is_supported(self.features) {
                report.skipped.push(op);
                continue;
            }
            match self.set_mode(op.code(), uid, package, AppOpMode::Allowed) {
                Ok(()) => report.granted.push(op),
                Err(e) => {
                    tracing::warn!(op = %op, package, error = %e, "Failed to allow app-op");
                    report.failed.push((op, e.to_string()));
                }
            }
        }

        tracing::info!(
            package,
            granted = report.granted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Self app-ops applied"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projector_common::error::{RemoteError, RemoteResult};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FlakyOps {
        calls: Mutex<Vec<i32>>,
    }

    impl AppOpsService for FlakyOps {
        fn set_mode(&self, op_code: i32, _: u32, _: &str, _: AppOpMode) -> RemoteResult<()> {
            self.calls.lock().unwrap().push(op_code);
            if op_code == AppOp::CallPhone.code() {
                return Err(RemoteError::Exception("SecurityException".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn allow_self_gates_ops_and_continues_past_failures() {
        let ops = Arc::new(FlakyOps::default());
        let controller = AppOpsController::new(
            Proxy::from_interface(ops.clone() as Arc<dyn AppOpsService>),
            PlatformFeatures::from_api_level(29),
        );

        let report = controller.allow_self(10_000, "dev.projector.agent");

        assert_eq!(
            report.granted,
            vec![
                AppOp::PostNotification,
                AppOp::SystemAlertWindow,
                AppOp::ReadPhoneState,
                AppOp::AccessAccessibility,
            ]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, AppOp::CallPhone);
        assert_eq!(report.skipped.len(), 3);
        assert!(!report.is_complete());
        assert!(!ops.calls.lock().unwrap().contains(&138));
    }

    #[test]
    fn op_support_follows_api_level() {
        let latest = PlatformFeatures::latest();
        assert!(AppOp::SELF_OPS.iter().all(|op| op.is_supported(latest)));
        assert!(!AppOp::AccessRestrictedSettings.is_supported(PlatformFeatures::from_api_level(32)));
        assert_eq!(AppOp::SystemAlertWindow.to_string(), "OP_SYSTEM_ALERT_WINDOW");
    }
}
