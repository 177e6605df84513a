//! Configuration loading and resolution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kolpages::{Destination, PatchSettings, CONTINUOUS_MARKER};

const CONFIG_FILE_NAME: &str = "appsettings.json";

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything the kiosk reads from `appsettings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KioskConfig {
    #[serde(alias = "Websites")]
    pub websites: Vec<Destination>,
    #[serde(alias = "Browser")]
    pub browser: BrowserSettings,
    #[serde(alias = "Patching")]
    pub patching: PatchingSettings,
}

/// Chromium launch options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Full-screen, chrome-less window.
    pub kiosk: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Explicit Chromium binary; discovered when absent.
    pub chromium_path: Option<String>,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            kiosk: true,
            window_width: 1280,
            window_height: 800,
            chromium_path: None,
            navigation_timeout_ms: 30_000,
        }
    }
}

/// Burst and upkeep timing as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchingSettings {
    pub burst_attempts: u32,
    pub burst_delay_ms: u64,
    pub upkeep_interval_ms: u64,
    pub continuous_marker: String,
}

impl Default for PatchingSettings {
    fn default() -> Self {
        let defaults = PatchSettings::default();
        Self {
            burst_attempts: defaults.burst_attempts,
            burst_delay_ms: defaults.burst_delay.as_millis() as u64,
            upkeep_interval_ms: defaults.upkeep_interval.as_millis() as u64,
            continuous_marker: CONTINUOUS_MARKER.to_string(),
        }
    }
}

impl PatchingSettings {
    /// Apply `KOLPAGES_BURST_ATTEMPTS`, `KOLPAGES_BURST_DELAY_MS` and
    /// `KOLPAGES_UPKEEP_INTERVAL_MS` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        self.burst_attempts = read_env_u32("KOLPAGES_BURST_ATTEMPTS", self.burst_attempts);
        self.burst_delay_ms = read_env_u64("KOLPAGES_BURST_DELAY_MS", self.burst_delay_ms);
        self.upkeep_interval_ms =
            read_env_u64("KOLPAGES_UPKEEP_INTERVAL_MS", self.upkeep_interval_ms);
        self
    }

    pub fn to_patch_settings(&self) -> PatchSettings {
        PatchSettings {
            burst_attempts: self.burst_attempts,
            burst_delay: Duration::from_millis(self.burst_delay_ms),
            upkeep_interval: Duration::from_millis(self.upkeep_interval_ms),
            continuous_marker: self.continuous_marker.clone(),
        }
    }
}

impl KioskConfig {
    /// Read, parse, apply env overrides, and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_json(&raw)?;
        config.patching = config.patching.with_env_overrides();
        config.validate()?;
        if config.websites.is_empty() {
            tracing::warn!("No sites configured in {}", path.display());
        }
        tracing::info!(
            "Loaded {} site(s) from {}",
            config.websites.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for site in &self.websites {
            let name = site.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("site with empty name".into()));
            }
            if site.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("site '{name}' has no url")));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::Invalid(format!("duplicate site name '{name}'")));
            }
        }
        if self.patching.burst_attempts == 0 {
            return Err(ConfigError::Invalid("burstAttempts must be at least 1".into()));
        }
        if self.patching.upkeep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "upkeepIntervalMs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Look a site up by name, ignoring case.
    pub fn find_site(&self, name: &str) -> Option<&Destination> {
        let name = name.trim();
        self.websites
            .iter()
            .find(|site| site.name.eq_ignore_ascii_case(name))
    }

    pub fn visible_sites(&self) -> impl Iterator<Item = &Destination> {
        self.websites.iter().filter(|site| site.visible)
    }
}

/// Resolve the config file path.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("KOLPAGES_CONFIG") {
        if !env_path.trim().is_empty() {
            return PathBuf::from(env_path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return cwd_config;
    }

    resolve_default_config_path()
}

fn resolve_default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kolpages")
        .join(CONFIG_FILE_NAME)
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_orchestrator_defaults() {
        let patching = PatchingSettings::default();
        assert_eq!(patching.to_patch_settings(), PatchSettings::default());
    }

    #[test]
    fn test_empty_object_is_valid() {
        let config = KioskConfig::from_json("{}").unwrap();
        assert!(config.websites.is_empty());
        assert!(config.validate().is_ok());
        assert!(config.browser.kiosk);
    }

    #[test]
    fn test_explicit_path_wins() {
        assert_eq!(
            resolve_config_path(Some("/etc/kolpages/sites.json")),
            PathBuf::from("/etc/kolpages/sites.json")
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config =
            KioskConfig::from_json(r#"{ "patching": { "burstAttempts": 0 } }"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
