#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for strap
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/strap/config.toml)
//! - Environment variables
//! - CLI flags (applied by the host application)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strap_errors::{ConfigError, Error};
use strap_types::{ColorChoice, DisplayMode, OutputFormat, RestartPolicy};
use tokio::fs;

/// File name of the resumable-state database inside the state directory
pub const STATE_DB_FILE: &str = "state.sqlite";

/// File name of the exclusive lock guarding the state directory
pub const STATE_LOCK_FILE: &str = "strap.lock";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub elevation: ElevationConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Engine behaviour defaults, overridable per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub display: DisplayMode,
    #[serde(default)]
    pub restart: RestartPolicy,
    /// Upper bound on re-running a failed package when the host answers Retry
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Elevated peer launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationConfig {
    /// Program and leading arguments used to start the privileged peer.
    /// The current executable and `elevated-peer` are appended.
    #[serde(default = "default_launcher")]
    pub launcher: Vec<String>,
    #[serde(default = "default_response_timeout")]
    pub response_timeout: u64, // seconds
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub state_path: Option<PathBuf>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            display: DisplayMode::Full,
            restart: RestartPolicy::Prompt,
            max_retries: default_max_retries(),
        }
    }
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            response_timeout: default_response_timeout(),
        }
    }
}

impl ElevationConfig {
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout)
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_max_retries() -> u32 {
    3
}

fn default_launcher() -> Vec<String> {
    vec!["sudo".to_string(), "-n".to_string()]
}

fn default_response_timeout() -> u64 {
    600 // 10 minutes; a single package action can be slow
}

fn invalid(field: &str, value: String) -> Error {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    }
    .into()
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NoDefaultLocation {
            what: "config directory".to_string(),
        })?;
        Ok(config_dir.join("strap").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, if the file contents
    /// contain invalid TOML syntax, or if a value fails validation.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// If path is provided, loads from that file.
    /// If path is None, uses the default loading behavior.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Check values that deserialize fine but cannot be used
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.elevation.launcher.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid {
                message: "elevation.launcher entries must not be empty".to_string(),
            }
            .into());
        }
        if self.elevation.response_timeout == 0 {
            return Err(invalid("elevation.response_timeout", "0".to_string()));
        }
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // STRAP_OUTPUT
        if let Ok(output) = std::env::var("STRAP_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => return Err(invalid("STRAP_OUTPUT", output)),
            };
        }

        // STRAP_COLOR
        if let Ok(color) = std::env::var("STRAP_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => return Err(invalid("STRAP_COLOR", color)),
            };
        }

        // STRAP_DISPLAY
        if let Ok(display) = std::env::var("STRAP_DISPLAY") {
            self.engine.display = display
                .parse()
                .map_err(|_| invalid("STRAP_DISPLAY", display))?;
        }

        // STRAP_RESTART
        if let Ok(restart) = std::env::var("STRAP_RESTART") {
            self.engine.restart = restart
                .parse()
                .map_err(|_| invalid("STRAP_RESTART", restart))?;
        }

        // STRAP_MAX_RETRIES
        if let Ok(retries) = std::env::var("STRAP_MAX_RETRIES") {
            self.engine.max_retries = retries
                .parse()
                .map_err(|_| invalid("STRAP_MAX_RETRIES", retries))?;
        }

        // STRAP_ELEVATION_TIMEOUT
        if let Ok(timeout) = std::env::var("STRAP_ELEVATION_TIMEOUT") {
            self.elevation.response_timeout = match timeout.parse() {
                Ok(0) | Err(_) => return Err(invalid("STRAP_ELEVATION_TIMEOUT", timeout)),
                Ok(secs) => secs,
            };
        }

        // STRAP_STATE_PATH
        if let Ok(path) = std::env::var("STRAP_STATE_PATH") {
            if path.is_empty() {
                return Err(invalid("STRAP_STATE_PATH", path));
            }
            self.paths.state_path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Get the state directory (with default)
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the platform has no
    /// state or local data directory.
    pub fn state_path(&self) -> Result<PathBuf, Error> {
        if let Some(path) = &self.paths.state_path {
            return Ok(path.clone());
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|dir| dir.join("strap"))
            .ok_or_else(|| {
                ConfigError::NoDefaultLocation {
                    what: "state directory".to_string(),
                }
                .into()
            })
    }

    /// Get the resumable-state database path
    ///
    /// # Errors
    ///
    /// See [`Config::state_path`].
    pub fn db_path(&self) -> Result<PathBuf, Error> {
        Ok(self.state_path()?.join(STATE_DB_FILE))
    }

    /// Get the state lock file path
    ///
    /// # Errors
    ///
    /// See [`Config::state_path`].
    pub fn lock_path(&self) -> Result<PathBuf, Error> {
        Ok(self.state_path()?.join(STATE_LOCK_FILE))
    }
}
