use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Root of all checkpoint directories - computed from home unless set
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub profile: Profile,

    #[serde(default)]
    pub autosave: AutosaveConfig,

    #[serde(default)]
    pub housekeeping: HousekeepingConfig,

    #[serde(default)]
    pub clock: ClockConfig,
}

// ── Deployment profile ────────────────────────────────────────────

/// Deployment profile. Fixes the autosave slot count and period at startup;
/// neither is ever changed at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    pub fn max_slots(self) -> u32 {
        match self {
            Self::Development => 3,
            Self::Production => 10,
        }
    }

    pub fn period_minutes(self) -> u64 {
        match self {
            Self::Development => 5,
            Self::Production => 30,
        }
    }
}

// ── Autosave section ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutosaveConfig {
    /// Overrides the profile's slot count when set.
    pub max_slots: Option<u32>,
    /// Overrides the profile's period when set.
    pub period_minutes: Option<u64>,
}

/// Resolved autosave constants handed to the checkpoint manager.
#[derive(Debug, Clone, Copy)]
pub struct AutosaveSettings {
    pub max_slots: u32,
    pub period: Duration,
}

// ── Housekeeping section ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// How often each store runs its own maintenance cycle.
    pub interval_minutes: u64,
    /// Network sessions idle longer than this are expired.
    pub session_idle_minutes: u64,
    /// Resolved feedback entries older than this are pruned.
    pub feedback_retention_days: u64,
    /// Pending account registrations older than this are dropped.
    pub pending_account_ttl_minutes: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            session_idle_minutes: 120,
            feedback_retention_days: 90,
            pending_account_ttl_minutes: 60,
        }
    }
}

// ── Clock section ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Refresh period of the coarse clock, in milliseconds.
    pub refresh_millis: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            refresh_millis: 1_000,
        }
    }
}

// ── Loading / persistence ─────────────────────────────────────────

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let coffer_dir = home.join(".coffer");
        Self::load_or_init_at(&coffer_dir)
    }

    /// Same as [`Config::load_or_init`] with an explicit app directory.
    /// Tests point this at a tempdir.
    pub fn load_or_init_at(coffer_dir: &Path) -> Result<Self> {
        let config_path = coffer_dir.join("config.toml");

        if !coffer_dir.exists() {
            fs::create_dir_all(coffer_dir).context("Failed to create .coffer directory")?;
        }

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config.validate()?;
            Ok(config)
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.validate()?;
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let settings = self.autosave_settings();
        if settings.max_slots == 0 {
            return Err(ConfigError::Validation(
                "autosave.max_slots must be at least 1".into(),
            ));
        }
        if settings.period.is_zero() {
            return Err(ConfigError::Validation(
                "autosave.period_minutes must be at least 1".into(),
            ));
        }
        if self.clock.refresh_millis == 0 {
            return Err(ConfigError::Validation(
                "clock.refresh_millis must be at least 1".into(),
            ));
        }
        if self.housekeeping.interval_minutes == 0 {
            return Err(ConfigError::Validation(
                "housekeeping.interval_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Autosave constants for this deployment: explicit config values win,
    /// otherwise the profile decides.
    pub fn autosave_settings(&self) -> AutosaveSettings {
        let max_slots = self.autosave.max_slots.unwrap_or(self.profile.max_slots());
        let minutes = self
            .autosave
            .period_minutes
            .unwrap_or(self.profile.period_minutes());
        AutosaveSettings {
            max_slots,
            period: Duration::from_secs(minutes * 60),
        }
    }

    /// Root directory that holds the checkpoint tree and the durable
    /// autosave record.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            self.config_path
                .parent()
                .map_or_else(|| PathBuf::from("data"), |dir| dir.join("data"))
        })
    }
}
