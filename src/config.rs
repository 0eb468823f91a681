// Runtime settings, optionally read from a JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("poll_interval_secs must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Program used for every systemd query.
    #[serde(default = "default_systemctl")]
    pub systemctl: String,

    /// Where legacy init scripts live.
    #[serde(default = "default_init_script_dir")]
    pub init_script_dir: PathBuf,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            systemctl: default_systemctl(),
            init_script_dir: default_init_script_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_systemctl() -> String {
    "systemctl".to_string()
}

fn default_init_script_dir() -> PathBuf {
    PathBuf::from("/etc/init.d")
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    300
}

impl Settings {
    /// Reads settings from `path`, or returns the defaults when no path is given.
    /// An explicitly named file that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}
