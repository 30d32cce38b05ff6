//! Configuration file management for certscan.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Default values
//! 2. Configuration file (`certscan.toml` in the working directory, or `--config`)
//! 3. Command-line arguments
//!
//! # Example Configuration File
//!
//! ```toml
//! hosts = ["example.com", "example.com:8443"]
//! list_file = "hosts.txt"
//! days = 30
//! timeout = 5
//! output = "summary"
//! exit_code = 1
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "certscan.toml";
pub const DEFAULT_THRESHOLD_DAYS: i64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Scan configuration.
///
/// All fields are optional so partial layers can be merged.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Hosts to scan
    pub hosts: Option<Vec<String>>,
    /// Newline-delimited file of hosts to scan
    pub list_file: Option<PathBuf>,
    /// Alert threshold: certificates with fewer days left are expiring soon
    pub days: Option<i64>,
    /// TCP connect timeout per host, in seconds
    pub timeout: Option<u64>,
    /// Output format: text, json, summary
    pub output: Option<String>,
    /// Exit code to use when at least one certificate is expired
    pub exit_code: Option<i32>,
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus Push Gateway settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrometheusConfig {
    pub enabled: Option<bool>,
    /// Push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hosts: None,
            list_file: None,
            days: Some(DEFAULT_THRESHOLD_DAYS),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            output: Some("text".to_string()),
            exit_code: Some(0),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// ```no_run
    /// # use certscan::config::Config;
    /// let config = Config::from_file("certscan.toml")?;
    /// # Ok::<(), certscan::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "loaded configuration file");

        Ok(config)
    }

    /// Loads the explicit config file, or `certscan.toml` if it exists.
    ///
    /// Returns `Ok(None)` when neither is present.
    pub fn discover(explicit: Option<&Path>) -> Result<Option<Self>, ConfigError> {
        match explicit {
            Some(path) => Config::from_file(path).map(Some),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Config::from_file(default_path).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Merges this configuration with another, `other` winning where it has a value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.hosts.is_some() {
            self.hosts = other.hosts;
        }
        if other.list_file.is_some() {
            self.list_file = other.list_file;
        }
        if other.days.is_some() {
            self.days = other.days;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Builds the command-line overlay. Options left unset on the command
    /// line stay `None` so they do not override file values.
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli_args(
        hosts: Option<Vec<String>>,
        list_file: Option<PathBuf>,
        days: Option<i64>,
        timeout: Option<u64>,
        output: Option<String>,
        exit_code: Option<i32>,
        prometheus: Option<bool>,
        prometheus_address: Option<String>,
    ) -> Self {
        Config {
            hosts,
            list_file,
            days,
            timeout,
            output,
            exit_code,
            prometheus: Some(PrometheusConfig {
                enabled: prometheus,
                address: prometheus_address,
            }),
        }
    }

    /// Rejects values no scan can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == Some(0) {
            return Err(ConfigError::Validation(
                "timeout must be at least one second".to_string(),
            ));
        }
        if let Some(ref prom) = self.prometheus {
            if prom.enabled == Some(true) && prom.address.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "prometheus is enabled but no address is set".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn threshold_days(&self) -> i64 {
        self.days.unwrap_or(DEFAULT_THRESHOLD_DAYS)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Push gateway address when pushing is enabled.
    pub fn prometheus_address(&self) -> Option<&str> {
        let prom = self.prometheus.as_ref()?;
        if prom.enabled == Some(true) {
            prom.address.as_deref()
        } else {
            None
        }
    }

    /// A sample configuration file with every option set.
    pub fn example_toml() -> String {
        let example = Config {
            hosts: Some(vec![
                "example.com".to_string(),
                "example.com:8443".to_string(),
                "https://secure.example.com:9443".to_string(),
                "expired.badssl.com".to_string(),
            ]),
            list_file: Some(PathBuf::from("hosts.txt")),
            days: Some(30),
            timeout: Some(5),
            output: Some("summary".to_string()),
            exit_code: Some(1),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Reads a newline-delimited host list, dropping blank lines.
pub fn read_host_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Errors that can occur while loading configuration or host lists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO Error: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse Error: {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("Validation Error: {0}")]
    Validation(String),
}
