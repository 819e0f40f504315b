//! Virtual display configuration.

use std::fmt;

use projector_common::error::{ProjectorError, ProjectorResult};
use serde::{Deserialize, Serialize};

use crate::features::{Feature, PlatformFeatures};

/// Platform-assigned identity of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(pub i32);

impl DisplayId {
    /// The built-in display.
    pub const DEFAULT: DisplayId = DisplayId(0);
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to the surface a virtual display renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceRef(pub u64);

/// Capability modifiers for a virtual display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayFlags(u32);

impl DisplayFlags {
    pub const NONE: DisplayFlags = DisplayFlags(0);
    pub const PUBLIC: DisplayFlags = DisplayFlags(1 << 0);
    pub const PRESENTATION: DisplayFlags = DisplayFlags(1 << 1);
    pub const SECURE: DisplayFlags = DisplayFlags(1 << 2);
    pub const OWN_CONTENT_ONLY: DisplayFlags = DisplayFlags(1 << 3);
    pub const AUTO_MIRROR: DisplayFlags = DisplayFlags(1 << 4);
    pub const TRUSTED: DisplayFlags = DisplayFlags(1 << 10);
    pub const OWN_DISPLAY_GROUP: DisplayFlags = DisplayFlags(1 << 11);
    pub const ALWAYS_UNLOCKED: DisplayFlags = DisplayFlags(1 << 12);

    const NAMED: [(&'static str, DisplayFlags); 8] = [
        ("public", Self::PUBLIC),
        ("presentation", Self::PRESENTATION),
        ("secure", Self::SECURE),
        ("own_content_only", Self::OWN_CONTENT_ONLY),
        ("auto_mirror", Self::AUTO_MIRROR),
        ("trusted", Self::TRUSTED),
        ("own_display_group", Self::OWN_DISPLAY_GROUP),
        ("always_unlocked", Self::ALWAYS_UNLOCKED),
    ];

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(&self, other: DisplayFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: DisplayFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parse a comma separated list of flag names, e.g. `"public,auto_mirror"`.
    pub fn parse(list: &str) -> ProjectorResult<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Self::NONE, |acc, name| {
                let normalized = name.to_ascii_lowercase().replace('-', "_");
                Self::NAMED
                    .iter()
                    .find(|(n, _)| *n == normalized)
                    .map(|(_, flag)| acc | *flag)
                    .ok_or_else(|| {
                        ProjectorError::invalid_configuration(format!(
                            "unknown display flag '{name}'"
                        ))
                    })
            })
    }

    /// Names of the flags set, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl std::ops::BitOr for DisplayFlags {
    type Output = DisplayFlags;

    fn bitor(self, rhs: DisplayFlags) -> DisplayFlags {
        DisplayFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DisplayFlags {
    fn bitor_assign(&mut self, rhs: DisplayFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DisplayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

/// Immutable parameters of a virtual display.
///
/// Only [`DisplayConfigBuilder::build`] produces one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayConfig {
    name: String,
    width: u32,
    height: u32,
    density: u32,
    surface: Option<SurfaceRef>,
    flags: DisplayFlags,
}

impl DisplayConfig {
    pub fn builder(
        name: impl Into<String>,
        width: u32,
        height: u32,
        density: u32,
    ) -> ProjectorResult<DisplayConfigBuilder> {
        DisplayConfigBuilder::new(name, width, height, density)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn density(&self) -> u32 {
        self.density
    }

    pub fn surface(&self) -> Option<SurfaceRef> {
        self.surface
    }

    pub fn flags(&self) -> DisplayFlags {
        self.flags
    }
}

/// Builder for [`DisplayConfig`].
#[derive(Debug, Clone)]
pub struct DisplayConfigBuilder {
    config: DisplayConfig,
    features: PlatformFeatures,
}

impl DisplayConfigBuilder {
    /// Start a configuration. Fails fast on an empty name or a zero dimension.
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        density: u32,
    ) -> ProjectorResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProjectorError::invalid_configuration(
                "display name must not be empty",
            ));
        }
        if width == 0 || height == 0 {
            return Err(ProjectorError::invalid_configuration(format!(
                "display size must be positive, got {width}x{height}"
            )));
        }
        if density == 0 {
            return Err(ProjectorError::invalid_configuration(
                "display density must be positive",
            ));
        }

        Ok(Self {
            config: DisplayConfig {
                name,
                width,
                height,
                density,
                surface: None,
                flags: DisplayFlags::NONE,
            },
            features: PlatformFeatures::default(),
        })
    }

    pub fn with_surface(mut self, surface: SurfaceRef) -> Self {
        self.config.surface = Some(surface);
        self
    }

    pub fn with_flags(mut self, flags: DisplayFlags) -> Self {
        self.config.flags = flags;
        self
    }

    /// Gate flags against the calling environment instead of the newest platform.
    pub fn with_features(mut self, features: PlatformFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn build(self) -> ProjectorResult<DisplayConfig> {
        let gated = [
            (
                DisplayFlags::TRUSTED | DisplayFlags::OWN_DISPLAY_GROUP,
                Feature::TrustedDisplays,
            ),
            (DisplayFlags::ALWAYS_UNLOCKED, Feature::AlwaysUnlockedDisplays),
        ];
        for (flags, feature) in gated {
            if self.config.flags.intersects(flags) && !self.features.supports(feature) {
                return Err(ProjectorError::invalid_configuration(format!(
                    "flags {} need API level {} (have {})",
                    DisplayFlags::from_bits(self.config.flags.bits() & flags.bits()),
                    feature.min_api_level(),
                    self.features.api_level()
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_reference_configuration() {
        let config = DisplayConfigBuilder::new("cap1", 1080, 1920, 320)
            .unwrap()
            .with_surface(SurfaceRef(7))
            .with_flags(DisplayFlags::PUBLIC | DisplayFlags::OWN_CONTENT_ONLY)
            .build()
            .unwrap();

        assert_eq!(config.name(), "cap1");
        assert_eq!((config.width(), config.height()), (1080, 1920));
        assert_eq!(config.density(), 320);
        assert_eq!(config.surface(), Some(SurfaceRef(7)));
        assert!(config.flags().contains(DisplayFlags::PUBLIC));
        assert!(!config.flags().contains(DisplayFlags::AUTO_MIRROR));
    }

    #[test]
    fn rejects_zero_dimensions_and_empty_name() {
        for (name, w, h, d) in [
            ("cap", 0, 1920, 320),
            ("cap", 1080, 0, 320),
            ("cap", 1080, 1920, 0),
            ("  ", 1080, 1920, 320),
        ] {
            let err = DisplayConfigBuilder::new(name, w, h, d).unwrap_err();
            assert!(
                matches!(err, ProjectorError::InvalidConfiguration { .. }),
                "unexpected error for {name:?} {w}x{h}@{d}: {err}"
            );
        }
    }

    #[test]
    fn gated_flags_need_supporting_features() {
        let old = PlatformFeatures::from_api_level(29);
        let err = DisplayConfigBuilder::new("cap", 10, 10, 160)
            .unwrap()
            .with_flags(DisplayFlags::TRUSTED)
            .with_features(old)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("trusted"));

        let ok = DisplayConfigBuilder::new("cap", 10, 10, 160)
            .unwrap()
            .with_flags(DisplayFlags::TRUSTED | DisplayFlags::ALWAYS_UNLOCKED)
            .with_features(PlatformFeatures::from_api_level(33))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn serializes_ids_and_flags_as_numbers() {
        let config = DisplayConfigBuilder::new("cap1", 1080, 1920, 320)
            .unwrap()
            .with_flags(DisplayFlags::PUBLIC | DisplayFlags::OWN_CONTENT_ONLY)
            .build()
            .unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["flags"], 9);
        assert_eq!(json["surface"], serde_json::Value::Null);
        assert_eq!(serde_json::to_string(&DisplayId(4)).unwrap(), "4");
    }

    #[test]
    fn parse_flag_lists() {
        let flags = DisplayFlags::parse("public, own-content-only").unwrap();
        assert_eq!(flags, DisplayFlags::PUBLIC | DisplayFlags::OWN_CONTENT_ONLY);
        assert_eq!(flags.to_string(), "public,own_content_only");
        assert_eq!(DisplayFlags::parse("").unwrap(), DisplayFlags::NONE);
        assert!(DisplayFlags::parse("public,mirror").is_err());
    }
}
