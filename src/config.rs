//! Meter configuration.
//!
//! Timeouts are expressed in seconds on the capture's own clock. Neither
//! timeout has a default: they must come from the config file or the command
//! line.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::ConfigError;

/// Minimum gap, in capture seconds, between two timeout sweeps.
pub const DEFAULT_STATUS_INTERVAL: f64 = 1.0;

/// Immutable settings handed to the flow table when it is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    active_timeout: f64,
    idle_timeout: f64,
    status_interval: f64,
    entropy: bool,
}

impl MeterConfig {
    pub fn new(active_timeout: f64, idle_timeout: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            active_timeout: positive("active_timeout", active_timeout)?,
            idle_timeout: positive("idle_timeout", idle_timeout)?,
            status_interval: DEFAULT_STATUS_INTERVAL,
            entropy: true,
        })
    }

    pub fn with_status_interval(mut self, status_interval: f64) -> Result<Self, ConfigError> {
        if !status_interval.is_finite() || status_interval < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "status_interval",
                expected: "a finite number of at least 0",
                value: status_interval,
            });
        }
        self.status_interval = status_interval;
        Ok(self)
    }

    pub fn with_entropy(mut self, entropy: bool) -> Self {
        self.entropy = entropy;
        self
    }

    /// Longest span from a flow's first packet before it is cut and recycled.
    pub fn active_timeout(&self) -> f64 {
        self.active_timeout
    }

    /// Longest silence after a flow's last packet before it is evicted.
    pub fn idle_timeout(&self) -> f64 {
        self.idle_timeout
    }

    pub fn status_interval(&self) -> f64 {
        self.status_interval
    }

    pub fn entropy(&self) -> bool {
        self.entropy
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue { name, expected: "a finite number greater than 0", value })
    }
}

/// Partially specified settings, as read from a JSON file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub active_timeout: Option<f64>,
    pub idle_timeout: Option<f64>,
    pub status_interval: Option<f64>,
    pub entropy: Option<bool>,
}

impl ConfigFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_json::from_str(&s)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Layers `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: ConfigFile) -> ConfigFile {
        ConfigFile {
            active_timeout: overrides.active_timeout.or(self.active_timeout),
            idle_timeout: overrides.idle_timeout.or(self.idle_timeout),
            status_interval: overrides.status_interval.or(self.status_interval),
            entropy: overrides.entropy.or(self.entropy),
        }
    }

    pub fn into_config(self) -> Result<MeterConfig, ConfigError> {
        let active = self.active_timeout.ok_or(ConfigError::Missing("active_timeout"))?;
        let idle = self.idle_timeout.ok_or(ConfigError::Missing("idle_timeout"))?;

        let mut config = MeterConfig::new(active, idle)?;
        if let Some(interval) = self.status_interval {
            config = config.with_status_interval(interval)?;
        }
        if let Some(entropy) = self.entropy {
            config = config.with_entropy(entropy);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn new_config_uses_defaults_for_optional_settings() {
        let config = MeterConfig::new(120.0, 60.0).unwrap();
        assert_eq!(config.active_timeout(), 120.0);
        assert_eq!(config.idle_timeout(), 60.0);
        assert_eq!(config.status_interval(), DEFAULT_STATUS_INTERVAL);
        assert!(config.entropy());
    }

    #[test]
    fn rejects_non_positive_timeouts() {
        assert!(matches!(
            MeterConfig::new(0.0, 60.0),
            Err(ConfigError::InvalidValue { name: "active_timeout", .. })
        ));
        assert!(matches!(
            MeterConfig::new(120.0, f64::NAN),
            Err(ConfigError::InvalidValue { name: "idle_timeout", .. })
        ));
        assert!(MeterConfig::new(120.0, 60.0).unwrap().with_status_interval(-1.0).is_err());
        assert!(MeterConfig::new(120.0, 60.0).unwrap().with_status_interval(0.0).is_ok());
    }

    #[test]
    fn missing_timeouts_are_reported() {
        let partial = ConfigFile { active_timeout: Some(10.0), ..Default::default() };
        assert!(matches!(partial.into_config(), Err(ConfigError::Missing("idle_timeout"))));
        assert!(matches!(
            ConfigFile::default().into_config(),
            Err(ConfigError::Missing("active_timeout"))
        ));
    }

    #[test]
    fn command_line_overrides_file_values() {
        let file = ConfigFile {
            active_timeout: Some(1800.0),
            idle_timeout: Some(5.0),
            status_interval: Some(2.0),
            entropy: Some(false),
        };
        let cli = ConfigFile { idle_timeout: Some(60.0), ..Default::default() };

        let config = file.merge(cli).into_config().unwrap();
        assert_eq!(config.active_timeout(), 1800.0);
        assert_eq!(config.idle_timeout(), 60.0);
        assert_eq!(config.status_interval(), 2.0);
        assert!(!config.entropy());
    }

    #[test]
    fn loads_json_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = r#"{"active_timeout": 120, "idle_timeout": 60.5, "entropy": false}"#;
        file.write_all(json.as_bytes()).unwrap();

        let loaded = ConfigFile::load(file.path()).unwrap();
        assert_eq!(loaded.active_timeout, Some(120.0));
        assert_eq!(loaded.idle_timeout, Some(60.5));
        assert_eq!(loaded.status_interval, None);
        assert_eq!(loaded.entropy, Some(false));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"active_timeout": 120, "idle": 60}}"#).unwrap();
        assert!(matches!(ConfigFile::load(file.path()), Err(ConfigError::Parse { .. })));
    }
}
