// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated input devices)
    pub demo_mode: bool,

    /// Detector tuning
    pub detectors: DetectorConfig,

    /// Arbiter (confirmation/countdown) tuning
    pub arbiter: ArbiterConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Location configuration
    pub location: LocationConfig,

    /// Offline asset cache configuration
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Raksha".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: false,
            detectors: DetectorConfig::default(),
            arbiter: ArbiterConfig::default(),
            storage: StorageConfig::default(),
            location: LocationConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("raksha"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Detector tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// How long the SOS button must be held before firing, in milliseconds
    pub hold_ms: u64,

    /// Summed per-axis acceleration delta that counts as one shake
    pub shake_threshold: f64,

    /// Minimum spacing between qualifying shakes, in milliseconds
    pub shake_min_gap_ms: u64,

    /// Idle time after which the shake counter decays by one, in milliseconds
    pub shake_decay_ms: u64,

    /// Qualifying shakes required to trigger an emergency
    pub shakes_to_trigger: u32,

    /// Voice retry delay after a no-speech recognition error, in milliseconds
    pub voice_retry_short_ms: u64,

    /// Voice retry delay after any other recognition error, in milliseconds
    pub voice_retry_long_ms: u64,

    /// Delay before restarting voice recognition after a session ends
    pub voice_restart_ms: u64,

    /// Delay before resuming voice recognition when the app returns to
    /// the foreground
    pub voice_resume_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hold_ms: 3000,
            shake_threshold: 15.0,
            shake_min_gap_ms: 500,
            shake_decay_ms: 2000,
            shakes_to_trigger: 3,
            voice_retry_short_ms: 1000,
            voice_retry_long_ms: 3000,
            voice_restart_ms: 500,
            voice_resume_ms: 1000,
        }
    }
}

/// Arbiter tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Confirmation countdown length in seconds
    pub countdown_secs: u8,

    /// Countdown tick interval in milliseconds (1 Hz in production;
    /// tests shorten this)
    pub tick_interval_ms: u64,

    /// Delay between contact notification and the telephony hand-off
    pub dial_delay_ms: u64,

    /// Shorter hand-off delay used when notification fails
    pub notify_fallback_delay_ms: u64,

    /// Maximum retained emergency-log entries
    pub event_log_cap: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 10,
            tick_interval_ms: 1000,
            dial_delay_ms: 2000,
            notify_fallback_delay_ms: 1000,
            event_log_cap: 50,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key-value store path
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/raksha.db"),
        }
    }
}

/// Location configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Interval between position fixes from the watch task, in milliseconds
    pub watch_interval_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            watch_interval_ms: 5000,
        }
    }
}

/// Offline asset cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root directory; each version gets its own subdirectory
    pub cache_dir: PathBuf,

    /// Cache version tag; activation removes other versions
    pub version: String,

    /// Base URL assets are fetched from
    pub base_url: String,

    /// Assets that MUST be cached for offline operation
    pub core_assets: Vec<String>,

    /// Assets cached best-effort when available
    pub optional_assets: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/cache"),
            version: "v1.2.0".to_string(),
            base_url: "https://raksha.app".to_string(),
            core_assets: vec![
                "/index.html".to_string(),
                "/styles.css".to_string(),
                "/app.js".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
            ],
            optional_assets: vec![
                "/icons/icon-72x72.png".to_string(),
                "/icons/icon-96x96.png".to_string(),
                "/icons/icon-128x128.png".to_string(),
                "/icons/icon-144x144.png".to_string(),
                "/icons/icon-152x152.png".to_string(),
                "/icons/icon-384x384.png".to_string(),
            ],
        }
    }
}
