//! Platform version gating as an explicit value.
//!
//! The calling environment resolves its API level once and passes the
//! resulting [`PlatformFeatures`] into configuration builders and service
//! wrappers. Nothing in this workspace probes the platform at runtime to
//! decide whether a field or operation exists.

use serde::{Deserialize, Serialize};

use projector_common::config::PlatformConfig;

/// A version-gated field or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Config-object based `createVirtualDisplay` (API 33).
    VirtualDisplayConfig,
    /// `TRUSTED` and `OWN_DISPLAY_GROUP` display flags (API 30).
    TrustedDisplays,
    /// `ALWAYS_UNLOCKED` display flag (API 33).
    AlwaysUnlockedDisplays,
    /// Display filter argument of `getTasks` (API 29).
    TaskDisplayFilter,
    /// `OP_ACCESS_ACCESSIBILITY` (API 29).
    AccessibilityOp,
    /// `OP_ACCESS_RESTRICTED_SETTINGS` (API 33).
    RestrictedSettingsOp,
    /// `OP_FOREGROUND_SERVICE_SPECIAL_USE` (API 34).
    ForegroundServiceSpecialUseOp,
    /// `OP_CREATE_ACCESSIBILITY_OVERLAY` (API 34).
    AccessibilityOverlayOp,
}

impl Feature {
    /// Minimum API level that provides this feature.
    pub fn min_api_level(&self) -> u32 {
        match self {
            Feature::TaskDisplayFilter | Feature::AccessibilityOp => 29,
            Feature::TrustedDisplays => 30,
            Feature::VirtualDisplayConfig
            | Feature::AlwaysUnlockedDisplays
            | Feature::RestrictedSettingsOp => 33,
            Feature::ForegroundServiceSpecialUseOp | Feature::AccessibilityOverlayOp => 34,
        }
    }

    pub const ALL: [Feature; 8] = [
        Feature::VirtualDisplayConfig,
        Feature::TrustedDisplays,
        Feature::AlwaysUnlockedDisplays,
        Feature::TaskDisplayFilter,
        Feature::AccessibilityOp,
        Feature::RestrictedSettingsOp,
        Feature::ForegroundServiceSpecialUseOp,
        Feature::AccessibilityOverlayOp,
    ];
}

/// Features available in the calling environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFeatures {
    api_level: u32,
}

impl PlatformFeatures {
    /// Newest API level this workspace knows about.
    pub const LATEST_API_LEVEL: u32 = 34;

    pub fn from_api_level(api_level: u32) -> Self {
        Self { api_level }
    }

    pub fn latest() -> Self {
        Self::from_api_level(Self::LATEST_API_LEVEL)
    }

    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.api_level >= feature.min_api_level()
    }
}

impl Default for PlatformFeatures {
    fn default() -> Self {
        Self::latest()
    }
}

impl From<&PlatformConfig> for PlatformFeatures {
    fn from(config: &PlatformConfig) -> Self {
        Self::from_api_level(config.api_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gating_follows_api_level() {
        let q = PlatformFeatures::from_api_level(29);
        assert!(q.supports(Feature::TaskDisplayFilter));
        assert!(q.supports(Feature::AccessibilityOp));
        assert!(!q.supports(Feature::TrustedDisplays));
        assert!(!q.supports(Feature::AccessibilityOverlayOp));

        let latest = PlatformFeatures::latest();
        assert!(Feature::ALL.iter().all(|f| latest.supports(*f)));
    }

    #[test]
    fn features_come_from_platform_config() {
        let config = PlatformConfig {
            api_level: 33,
            ..PlatformConfig::default()
        };
        let features = PlatformFeatures::from(&config);
        assert!(features.supports(Feature::RestrictedSettingsOp));
        assert!(!features.supports(Feature::ForegroundServiceSpecialUseOp));
    }
}
