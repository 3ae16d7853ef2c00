//! Application configuration management.
//!
//! Configuration covers the API base URL, the office zone used for
//! geofence gating, the static asset manifest and cache version, and
//! the dynamic cache cap. Stored at `~/.config/clockin/config.json`;
//! `CLOCKIN_API_URL` (usually via `.env`) overrides the API base URL.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::manager::DEFAULT_DYNAMIC_MAX_ENTRIES;
use crate::geofence::OfficeZone;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "clockin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub office: OfficeZone,
    /// URLs cached verbatim at install time, as a unit.
    #[serde(default)]
    pub static_assets: Vec<String>,
    /// Bumping this replaces the static set wholesale on the next
    /// install/activate cycle.
    #[serde(default = "default_cache_version")]
    pub cache_version: u32,
    #[serde(default = "default_dynamic_max_entries")]
    pub dynamic_max_entries: usize,
    #[serde(default)]
    pub last_username: Option<String>,
    /// Optional path to a JSON position fix maintained by an external
    /// location agent.
    #[serde(default)]
    pub position_fix_file: Option<PathBuf>,
}

fn default_cache_version() -> u32 {
    1
}

fn default_dynamic_max_entries() -> usize {
    DEFAULT_DYNAMIC_MAX_ENTRIES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            // Production office deployment.
            office: OfficeZone {
                latitude: 36.636736,
                longitude: 127.323375,
                radius_meters: 100.0,
            },
            static_assets: Vec::new(),
            cache_version: default_cache_version(),
            dynamic_max_entries: default_dynamic_max_entries(),
            last_username: None,
            position_fix_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("CLOCKIN_API_URL") {
            config.api_base_url = url;
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
