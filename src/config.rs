// Configuration for the viewer: loader, map, cache shim and environment profile.
// Every struct has a Default matching the stock page, and the whole tree can be
// read from a JSON file where deployments need different origins or timeouts.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::itinerary::LatLng;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub loader: LoaderConfig,
    pub map: MapConfig,
    pub shim: ShimConfig,
    pub environment: EnvironmentProfile,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub resource_name: String,
    // Origin the page itself is served from; relative strategies resolve against it
    pub base_url: String,
    pub fallback_origin: String,
    pub fallback_timeout_multiplier: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            resource_name: "itinerary.json".to_string(),
            base_url: "http://localhost/JpTravel/".to_string(),
            fallback_origin: "http://127.0.0.1/JpTravel/".to_string(),
            fallback_timeout_multiplier: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lng: f64,
    pub zoom: u8,
    pub tile_url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 35.68,
            center_lng: 139.75,
            zoom: 13,
            tile_url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            max_zoom: 19,
        }
    }
}

impl MapConfig {
    pub fn center(&self) -> LatLng {
        LatLng::new(self.center_lat, self.center_lng)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShimConfig {
    pub cache_name: String,
    pub critical_files: Vec<String>,
    pub purge_interval_seconds: u64,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            cache_name: "itinerary-cache-v1".to_string(),
            critical_files: vec![
                "itinerary.json".to_string(),
                "map.js".to_string(),
                "index.html".to_string(),
            ],
            purge_interval_seconds: 60,
        }
    }
}

impl ShimConfig {
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }
}

// Which loading indicator element a given environment owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Chromium,
    Webkit,
}

impl IndicatorKind {
    pub fn element_id(&self) -> &'static str {
        match self {
            IndicatorKind::Chromium => "loading-chromium",
            IndicatorKind::Webkit => "loading-webkit",
        }
    }
}

/// Capabilities of the environment the page runs in. Passed in explicitly at
/// construction instead of being guessed from a user-agent string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentProfile {
    pub supports_cache_api: bool,
    pub default_timeout_ms: u64,
    pub indicator: Option<IndicatorKind>,
}

impl Default for EnvironmentProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl EnvironmentProfile {
    pub fn generic() -> Self {
        Self {
            supports_cache_api: true,
            default_timeout_ms: 8000,
            indicator: None,
        }
    }

    pub fn chromium() -> Self {
        Self {
            supports_cache_api: true,
            default_timeout_ms: 5000,
            indicator: Some(IndicatorKind::Chromium),
        }
    }

    // Webkit ignores reload directives on cached JSON, so it gets longer
    // timeouts and no cache-reload strategy.
    pub fn webkit() -> Self {
        Self {
            supports_cache_api: false,
            default_timeout_ms: 10000,
            indicator: Some(IndicatorKind::Webkit),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl ViewerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reads the file when one is given, otherwise falls back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_json_file(path)
                .with_context(|| format!("failed to load viewer config from {}", path.display())),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loader.resource_name.trim().is_empty() {
            return Err(ConfigError::Invalid("resource_name must not be empty".to_string()));
        }
        if self.environment.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.loader.fallback_timeout_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "fallback_timeout_multiplier must be greater than zero".to_string(),
            ));
        }
        if self.map.zoom > self.map.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "zoom {} exceeds max_zoom {}",
                self.map.zoom, self.map.max_zoom
            )));
        }
        if self.shim.purge_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "purge_interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
