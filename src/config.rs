use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::poll::{PollPolicy, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_API_BASE: &str = "https://www.virustotal.com/api/v3";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const MAX_FILE_SIZE: u64 = 32 * 1024 * 1024;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;
pub const API_KEY_HEADER: &str = "x-apikey";

/// Settings for the binary: optional JSON file, then environment overrides.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_secs: u64,
    pub max_file_size: u64,
    pub history_limit: usize,
    pub history_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("VTSCAN_CONFIG").unwrap_or_else(|_| "vtscan.json".to_string());
        let mut cfg = Self::from_file(Path::new(&path))?.unwrap_or_default();
        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// Reads a JSON config file. A missing file is not an error.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIRUSTOTAL_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("VTSCAN_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("VTSCAN_API_BASE") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("VTSCAN_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_value("VTSCAN_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("VTSCAN_MAX_POLL_ATTEMPTS") {
            self.max_poll_attempts = parse_value("VTSCAN_MAX_POLL_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("VTSCAN_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_value("VTSCAN_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("VTSCAN_MAX_FILE_SIZE") {
            self.max_file_size = parse_value("VTSCAN_MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("VTSCAN_HISTORY_LIMIT") {
            self.history_limit = parse_value("VTSCAN_HISTORY_LIMIT", &v)?;
        }
        if let Some(v) = lookup("VTSCAN_HISTORY_PATH") {
            self.history_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Configuration handed to the orchestrator. Fails when no API key is set.
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(ServiceConfig {
            api_key: api_key.to_string(),
            base_url: self.api_base_url.trim_end_matches('/').to_string(),
            poll: PollPolicy {
                interval: Duration::from_secs(self.poll_interval_secs),
                max_attempts: self.max_poll_attempts,
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            api_key: None,
            poll_interval_secs: 2,
            max_poll_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout_secs: 30,
            max_file_size: MAX_FILE_SIZE,
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_path: None,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_file_size", &self.max_file_size)
            .field("history_limit", &self.history_limit)
            .field("history_path", &self.history_path)
            .finish()
    }
}

/// Everything the orchestrator needs to talk to the analysis service.
#[derive(Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub base_url: String,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
}

impl ServiceConfig {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll: PollPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("poll", &self.poll)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
