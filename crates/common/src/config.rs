//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Default virtual display parameters.
    pub display: DisplayDefaults,

    /// Identity and API level of the calling environment.
    pub platform: PlatformConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default virtual display parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayDefaults {
    /// Display name reported to the display service.
    pub name: String,

    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,

    /// Density in dots per inch.
    pub density: u32,

    /// Comma separated flag names (e.g. "public,own_content_only").
    pub flags: String,
}

/// Calling environment, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    /// OS API level used for feature gating.
    pub api_level: u32,

    /// Package name presented to remote services.
    pub caller_package: String,

    /// Calling uid.
    pub uid: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "projector_session=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            display: DisplayDefaults::default(),
            platform: PlatformConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DisplayDefaults {
    fn default() -> Self {
        Self {
            name: "projector-virtual".to_string(),
            width: 1080,
            height: 1920,
            density: 320,
            flags: "public,own_content_only".to_string(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_level: 34,
            caller_package: "dev.projector.agent".to_string(),
            uid: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("projector").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_display() {
        let config = AppConfig::default();
        assert_eq!(config.display.width, 1080);
        assert_eq!(config.display.height, 1920);
        assert_eq!(config.display.density, 320);
        assert_eq!(config.platform.api_level, 34);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "platform": { "api_level": 29 } }"#).unwrap();
        assert_eq!(config.platform.api_level, 29);
        assert_eq!(config.platform.caller_package, "dev.projector.agent");
        assert_eq!(config.display, DisplayDefaults::default());
    }

    #[test]
    fn save_then_load_from_path() {
        let dir = std::env::temp_dir().join(format!("projector-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = AppConfig::default();
        config.logging.level = "debug".to_string();
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path), config);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("projector-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
        std::fs::remove_dir_all(dir).ok();
    }
}
