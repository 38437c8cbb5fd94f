//! Connection parameters and configuration loading.

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default serial device on Linux hosts.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate of the MicroPython REPL.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Parameters used to open a connection to a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Serial port identifier, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// Baud rate.
    pub baud: u32,

    /// Seconds to wait for a command's output. `0` waits forever.
    pub timeout: u64,

    /// Soft-reset the interpreter when entering raw REPL mode.
    pub soft_reset: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            timeout: 0,
            soft_reset: true,
        }
    }
}

impl ConnectionParams {
    /// Create parameters for a port and baud rate.
    #[must_use]
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            ..Self::default()
        }
    }

    /// Set the output timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the soft reset on entering raw mode.
    #[must_use]
    pub const fn with_soft_reset(mut self, soft_reset: bool) -> Self {
        self.soft_reset = soft_reset;
        self
    }

    /// Output timeout as a duration, `None` when unbounded.
    #[must_use]
    pub const fn timeout_duration(&self) -> Option<Duration> {
        if self.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout))
        }
    }

    /// Default location of the config file, `<config_dir>/microesp/config.toml`.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("microesp").join("config.toml"))
    }

    /// Load parameters from a TOML file, then apply environment overrides.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut params: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        params.apply_env_overrides();
        Ok(params)
    }

    /// Load from `path` with fallback to defaults plus environment overrides.
    #[must_use]
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {err}, using defaults");
            let mut params = Self::default();
            params.apply_env_overrides();
            params
        })
    }

    /// Apply `MICROESP_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // MICROESP_PORT - serial port identifier
        if let Some(port) = lookup("MICROESP_PORT") {
            if !port.trim().is_empty() {
                self.port = port.trim().to_string();
            }
        }

        // MICROESP_BAUD - baud rate
        if let Some(value) = lookup("MICROESP_BAUD").and_then(|v| v.trim().parse().ok()) {
            self.baud = value;
        }

        // MICROESP_TIMEOUT - output timeout in seconds
        if let Some(value) = lookup("MICROESP_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.timeout = value;
        }
    }
}
