/*
 * This file is part of Radmon.
 *
 * Copyright (C) 2025 Radmon contributors
 *
 * Radmon is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Radmon is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Radmon. If not, see <https://www.gnu.org/licenses/>.
 */

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RadmonError, Result};
use crate::severity::ClampPolicy;

pub const DEFAULT_MAX_RADIATION_VALUE: f64 = 10_000.0;
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 500;
pub const DEFAULT_NOTIFICATION_SECS: u64 = 3;

/// Environment override for the scale denominator
pub const MAX_RADIATION_ENV: &str = "RADMON_MAX_RADIATION";

/// What the session does when the device reports an error after a successful open
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorPolicy {
    /// Report the error and keep the link open
    #[default]
    StayOpen,
    /// Report the error and close the link
    AutoClose,
}

fn default_max_radiation() -> f64 { DEFAULT_MAX_RADIATION_VALUE }
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }
fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL_MS }
fn default_refresh_interval_ms() -> u64 { DEFAULT_REFRESH_INTERVAL_MS }
fn default_notification_secs() -> u64 { DEFAULT_NOTIFICATION_SECS }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Raw value that corresponds to 100%
    #[serde(default = "default_max_radiation")]
    pub max_radiation_value: f64,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_notification_secs")]
    pub notification_secs: u64,
    #[serde(default)]
    pub clamp_policy: ClampPolicy,
    #[serde(default)]
    pub transport_error_policy: TransportErrorPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_radiation_value: DEFAULT_MAX_RADIATION_VALUE,
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            notification_secs: DEFAULT_NOTIFICATION_SECS,
            clamp_policy: ClampPolicy::None,
            transport_error_policy: TransportErrorPolicy::StayOpen,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_secs(self.notification_secs)
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("radmon").join("config.json");
    }
    if let Ok(home) = env::var("HOME") {
        return Path::new(&home)
            .join(".config")
            .join("radmon")
            .join("config.json");
    }
    PathBuf::from("/etc/radmon/config.json")
}

pub fn validate_config(cfg: &MonitorConfig) -> Result<()> {
    if !cfg.max_radiation_value.is_finite() || cfg.max_radiation_value <= 0.0 {
        return Err(RadmonError::invalid_config(
            "max_radiation_value",
            "must be a positive finite number",
        ));
    }
    if cfg.baud_rate == 0 || cfg.baud_rate > 4_000_000 {
        return Err(RadmonError::invalid_config("baud_rate", "out of range (1..4000000)"));
    }
    if cfg.poll_interval_ms < 100 || cfg.poll_interval_ms > 60_000 {
        return Err(RadmonError::invalid_config("poll_interval_ms", "out of range (100..60000)"));
    }
    if cfg.refresh_interval_ms < 10 || cfg.refresh_interval_ms > 60_000 {
        return Err(RadmonError::invalid_config("refresh_interval_ms", "out of range (10..60000)"));
    }
    if cfg.notification_secs == 0 || cfg.notification_secs > 3600 {
        return Err(RadmonError::invalid_config("notification_secs", "out of range (1..3600)"));
    }
    Ok(())
}

/// Parse and validate a config document, then apply the environment override.
pub fn parse_config(data: &str) -> Result<MonitorConfig> {
    let mut cfg: MonitorConfig = serde_json::from_str(data)?;
    apply_env_overrides(&mut cfg)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut MonitorConfig) -> Result<()> {
    if let Ok(v) = env::var(MAX_RADIATION_ENV) {
        cfg.max_radiation_value = v.trim().parse::<f64>().map_err(|_| {
            RadmonError::invalid_config(MAX_RADIATION_ENV, format!("not a number: '{}'", v))
        })?;
    }
    Ok(())
}

pub fn load_config_from(path: &Path) -> Result<MonitorConfig> {
    if path.is_dir() {
        return Err(RadmonError::Config(format!("{} is a directory", path.display())));
    }
    let data = fs::read_to_string(path)?;
    parse_config(&data)
}

/// Load the user config, falling back to defaults when no file exists.
pub fn load_config() -> Result<MonitorConfig> {
    let path = config_path();
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        let mut cfg = MonitorConfig::default();
        apply_env_overrides(&mut cfg)?;
        validate_config(&cfg)?;
        return Ok(cfg);
    }
    load_config_from(&path).map_err(|e| {
        warn!("Config at {} rejected: {}", path.display(), e);
        e
    })
}

pub fn save_config_to(path: &Path, cfg: &MonitorConfig) -> Result<()> {
    validate_config(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json)?;
    Ok(())
}
