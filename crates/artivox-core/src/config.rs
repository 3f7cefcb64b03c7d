//! Program configuration shared by the control thread and session setup
//!
//! The configuration carries the dynamic parameter list (its length is the
//! parameter count everywhere in the core), the control-step cadence, the
//! smoothing window, and the opaque engine configuration blob. It is
//! persisted as YAML; loading falls back to defaults on a missing or
//! invalid file so a bad config never prevents startup.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default control-step rate in Hz (one full parameter update every 4 ms).
pub const DEFAULT_CONTROL_RATE: f32 = 250.0;

/// Default parameter smoothing period in seconds.
pub const DEFAULT_FILTER_PERIOD: f32 = 0.02;

/// One entry of the dynamic parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicParameter {
    pub name: String,
    /// Value the parameter holds before the control thread sends anything.
    #[serde(default)]
    pub default: f32,
}

impl DynamicParameter {
    fn new(name: &str, default: f32) -> Self {
        Self {
            name: name.to_string(),
            default,
        }
    }
}

/// Shared program configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Name under which the session registers with the audio server.
    pub client_name: String,
    /// The dynamic parameter list; its length is the parameter count.
    pub dynamic_params: Vec<DynamicParameter>,
    /// Control-step rate in Hz.
    pub control_rate: f32,
    /// Parameter smoothing period in seconds.
    pub filter_period: f32,
    /// Opaque engine configuration blob, handed to the engine factory
    /// untouched.
    pub vtm: serde_yaml::Value,
    /// Output sample rate negotiated with the audio server; written by the
    /// session at start, not persisted.
    #[serde(skip)]
    pub output_rate: f32,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            client_name: "artivox_interactive".to_string(),
            dynamic_params: vec![
                DynamicParameter::new("glotPitch", 0.0),
                DynamicParameter::new("glotVol", 0.0),
                DynamicParameter::new("aspVol", 0.0),
                DynamicParameter::new("fricVol", 0.0),
                DynamicParameter::new("fricPos", 4.0),
                DynamicParameter::new("fricCF", 2500.0),
                DynamicParameter::new("fricBW", 500.0),
                DynamicParameter::new("r1", 0.8),
                DynamicParameter::new("r2", 0.8),
                DynamicParameter::new("r3", 0.8),
                DynamicParameter::new("r4", 0.8),
                DynamicParameter::new("r5", 0.8),
                DynamicParameter::new("r6", 0.8),
                DynamicParameter::new("r7", 0.8),
                DynamicParameter::new("r8", 0.8),
                DynamicParameter::new("velum", 0.1),
            ],
            control_rate: DEFAULT_CONTROL_RATE,
            filter_period: DEFAULT_FILTER_PERIOD,
            vtm: serde_yaml::Value::Null,
            output_rate: 0.0,
        }
    }
}

impl ProgramConfig {
    /// Number of dynamic parameters.
    pub fn num_parameters(&self) -> usize {
        self.dynamic_params.len()
    }

    /// Record the sample rate negotiated with the audio server so every
    /// downstream component agrees on the output rate.
    pub fn set_output_rate(&mut self, rate: f32) {
        self.output_rate = rate;
    }
}

/// Load configuration from a YAML file.
///
/// If the file doesn't exist, returns the default config. If the file
/// exists but is invalid, logs a warning and returns the default config.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("load_config: failed to parse config: {}, using defaults", e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: failed to read config file: {}, using defaults", e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let contents = serde_yaml::to_string(config).context("failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write config to {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameter_list() {
        let config = ProgramConfig::default();
        assert_eq!(config.num_parameters(), 16);
        assert_eq!(config.dynamic_params[0].name, "glotPitch");
        assert_eq!(config.control_rate, DEFAULT_CONTROL_RATE);
        assert_eq!(config.output_rate, 0.0);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ProgramConfig =
            serde_yaml::from_str("client_name: test_client\ncontrol_rate: 500.0\n").unwrap();
        assert_eq!(config.client_name, "test_client");
        assert_eq!(config.control_rate, 500.0);
        // Unspecified fields come from Default.
        assert_eq!(config.num_parameters(), 16);
        assert_eq!(config.filter_period, DEFAULT_FILTER_PERIOD);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config: ProgramConfig =
            load_config(Path::new("/nonexistent/artivox/config.yaml"));
        assert_eq!(config.num_parameters(), 16);
    }

    #[test]
    fn test_set_output_rate() {
        let mut config = ProgramConfig::default();
        config.set_output_rate(48000.0);
        assert_eq!(config.output_rate, 48000.0);
    }
}
