//! Configuration file support for i2cisp.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (I2CISP_*)
//! 3. Local config file (./i2cisp.toml)
//! 4. Global config file (~/.config/i2cisp/config.toml)
//!
//! An explicit `--config <PATH>` replaces 3 and 4.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use i2cisp::SessionConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
const LOCAL_CONFIG: &str = "i2cisp.toml";

/// Bus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusConfig {
    /// I2C bus device (e.g., "/dev/i2c-1").
    pub device: Option<String>,
    /// 7-bit slave address.
    pub address: Option<u8>,
}

/// Timing overrides, all in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    /// Pause between priming frame and chunk.
    pub chunk_delay_ms: Option<u64>,
    /// Pause between busy status reads.
    pub busy_delay_ms: Option<u64>,
    /// Busy replies tolerated per write.
    pub max_busy_polls: Option<u32>,
    /// Pause after entering force-IROM mode.
    pub after_mode_delay_ms: Option<u64>,
    /// Pause after entering the driver write state.
    pub after_state_delay_ms: Option<u64>,
    /// Pause after starting the driver.
    pub after_run_delay_ms: Option<u64>,
    /// Pause after the bank erase.
    pub after_erase_delay_ms: Option<u64>,
    /// Pause before the final hard reset.
    pub before_reset_delay_ms: Option<u64>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashConfig {
    /// Chunk size in bytes.
    pub chunk_size: Option<usize>,
    /// Hard reset the device on abort.
    pub reset_on_abort: Option<bool>,
    /// Send debug-on before entering force-IROM mode.
    #[serde(default)]
    pub debug_on: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Bus configuration.
    #[serde(default)]
    pub bus: BusConfig,
    /// Timing configuration.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike the implicit locations, an explicit file must exist and parse.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a specific file, warning on parse errors.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "i2cisp").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, other: Option<T>) {
            if other.is_some() {
                *slot = other;
            }
        }

        // Bus config
        take(&mut self.bus.device, other.bus.device);
        take(&mut self.bus.address, other.bus.address);

        // Timing config
        let t = other.timing;
        take(&mut self.timing.chunk_delay_ms, t.chunk_delay_ms);
        take(&mut self.timing.busy_delay_ms, t.busy_delay_ms);
        take(&mut self.timing.max_busy_polls, t.max_busy_polls);
        take(&mut self.timing.after_mode_delay_ms, t.after_mode_delay_ms);
        take(&mut self.timing.after_state_delay_ms, t.after_state_delay_ms);
        take(&mut self.timing.after_run_delay_ms, t.after_run_delay_ms);
        take(&mut self.timing.after_erase_delay_ms, t.after_erase_delay_ms);
        take(&mut self.timing.before_reset_delay_ms, t.before_reset_delay_ms);

        // Flash config
        take(&mut self.flash.chunk_size, other.flash.chunk_size);
        take(&mut self.flash.reset_on_abort, other.flash.reset_on_abort);
        if other.flash.debug_on {
            self.flash.debug_on = true;
        }
    }

    /// Apply the configured overrides on top of `base`.
    pub fn apply_to(&self, base: SessionConfig) -> SessionConfig {
        let ms = Duration::from_millis;
        let t = &self.timing;
        SessionConfig {
            chunk_delay: t.chunk_delay_ms.map_or(base.chunk_delay, ms),
            busy_delay: t.busy_delay_ms.map_or(base.busy_delay, ms),
            max_busy_polls: t.max_busy_polls.unwrap_or(base.max_busy_polls),
            after_mode_delay: t.after_mode_delay_ms.map_or(base.after_mode_delay, ms),
            after_state_delay: t.after_state_delay_ms.map_or(base.after_state_delay, ms),
            after_run_delay: t.after_run_delay_ms.map_or(base.after_run_delay, ms),
            after_erase_delay: t.after_erase_delay_ms.map_or(base.after_erase_delay, ms),
            before_reset_delay: t.before_reset_delay_ms.map_or(base.before_reset_delay, ms),
            chunk_size: self.flash.chunk_size.unwrap_or(base.chunk_size),
            reset_on_abort: self.flash.reset_on_abort.unwrap_or(base.reset_on_abort),
            debug_on: base.debug_on || self.flash.debug_on,
        }
    }
}
