use crate::window::Horizon;
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The configuration file exists but can not be used
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {

    #[error("config file can not be read from {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("config file {path:?} could not be parsed as JSON: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("horizon must be 20, 200 or 2000 readings, not {0}")]
    Horizon(usize),
}

/// Configuration of this application
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {

    /// Base URL of the BERNT API
    pub api_base_url: String,

    // Network timeout in milliseconds
    network_timeout_ms: u64,

    // Interval between sensor data polls in milliseconds
    poll_interval_ms: u64,

    /// File keeping the credential between runs
    pub credential_file: PathBuf,

    /// Number of most recent readings charted
    horizon: usize,

    /// File name of CSV exports
    pub export_file_name: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            api_base_url: "https://bernt.xyz/api".to_string(),
            network_timeout_ms: 10_000,
            poll_interval_ms: 60_000,
            credential_file: PathBuf::from(".bernt-token"),
            horizon: Horizon::default().count(),
            export_file_name: "sensor_data.csv".to_string(),
        }
    }
}

impl Config {

    /// Read the config file, falling back to defaults if there is none
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let config_as_string = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no config file at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        let config: Config = serde_json::from_str(&config_as_string)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.horizon()?;
        Ok(config)
    }

    /// Network connection timeout
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    /// Interval between sensor data polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn horizon(&self) -> Result<Horizon, ConfigError> {
        Horizon::from_count(self.horizon).ok_or(ConfigError::Horizon(self.horizon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read_from_file(dir.path().join("config.json")).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.horizon().unwrap(), Horizon::Last200);
        assert_eq!(config.export_file_name, "sensor_data.csv");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "api_base_url": "http://localhost:8000", "horizon": 20 }"#).unwrap();
        let config = Config::read_from_file(&path).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.horizon().unwrap(), Horizon::Last20);
        assert_eq!(config.network_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn bad_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::read_from_file(&path), Err(ConfigError::Parse { .. })));

        std::fs::write(&path, r#"{ "horizon": 50 }"#).unwrap();
        assert!(matches!(Config::read_from_file(&path), Err(ConfigError::Horizon(50))));
    }
}
