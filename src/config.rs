/// Application configuration, persisted as TOML in the config directory.
///
/// Default location:
///   $TAKE_CARE_HOME/config.toml, else ~/.take-care/config.toml
///
/// The `[user]` table holds the pacing preferences the coach evaluates with.
/// It is rewritten whenever the paired device pushes new settings or drink
/// types, so the latest values survive a restart.
use crate::models::{default_drink_types, DrinkTypeConfig, SourceDevice, UserSettings};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// How many recent advisories per session feed cooldown dedupe.
    /// Only the last 60 minutes matter, so 50 is plenty.
    #[serde(default = "default_recent_advisory_cap")]
    pub recent_advisory_cap: usize,

    /// Override for the re-evaluation tick. None = use the engine's hint.
    #[serde(default)]
    pub tick_interval_seconds: Option<u64>,

    /// Which device this process logs drinks as.
    #[serde(default)]
    pub source_device: SourceDevice,

    /// Pacing preferences (sensitivity, hydration reminders, auto-end).
    #[serde(default)]
    pub user: UserSettings,

    /// Drink menu. Seeded with shot / beer / cocktail / wine / water.
    #[serde(default = "default_drink_types")]
    pub drink_types: Vec<DrinkTypeConfig>,
}

fn default_recent_advisory_cap() -> usize { 50 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recent_advisory_cap:   default_recent_advisory_cap(),
            tick_interval_seconds: None,
            source_device:         SourceDevice::default(),
            user:                  UserSettings::default(),
            drink_types:           default_drink_types(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Directory helpers
// ---------------------------------------------------------------------------

/// Base directory for config, journal and logs.
/// $TAKE_CARE_HOME wins, then ~/.take-care, then the temp dir.
pub fn default_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("TAKE_CARE_HOME") {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".take-care"))
        .unwrap_or_else(|_| std::env::temp_dir().join("take-care"))
}
