use std::{fs, path::PathBuf};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::trajectory::SyntheticFlight;

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// how long to wait for the board to answer a command
    pub timeout_ms: u64,
    pub synthetic_flight: SyntheticFlight,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115200,
            timeout_ms: 2000,
            synthetic_flight: SyntheticFlight::default(),
        }
    }
}

impl CliConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let config_str = fs::read_to_string(config_path)?;
        let config = toml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(config_path, config_str)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("ca.macrocketry", "MacRocketry", "recovery-cli")
            .ok_or_else(|| anyhow!("no home directory"))?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: CliConfig = toml::from_str(
            "port = \"/dev/ttyUSB0\"\n[synthetic_flight]\nperturbation = true\n",
        )
        .unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate, 115200);
        assert!(config.synthetic_flight.perturbation);
        assert_eq!(config.synthetic_flight.final_altitude, 40.0);
    }
}
