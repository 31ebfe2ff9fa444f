use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::default_scratch_dir;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";

const CONFIG_FILE_PATH: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-wide settings. Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub assistant_id: Option<String>,
    /// Default thread used when browsing history.
    pub thread_id: Option<String>,
    pub model: Option<String>,
    pub http_proxy: String,
    pub https_proxy: String,
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for one run; 0 means no deadline.
    pub max_wait_secs: u64,
    pub upload_max_retries: u32,
    pub scratch_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            assistant_id: None,
            thread_id: None,
            model: Some(DEFAULT_MODEL.to_string()),
            http_proxy: String::new(),
            https_proxy: String::new(),
            poll_interval_ms: 1000,
            max_wait_secs: 300,
            upload_max_retries: 3,
            scratch_dir: default_scratch_dir(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid number", name, value);
            None
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory (if present), then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let file_content = if path.exists() {
            Some(std::fs::read_to_string(path)?)
        } else {
            None
        };
        Self::from_sources(file_content.as_deref(), |name| std::env::var(name).ok())
    }

    /// Build a config from optional TOML text and an environment lookup.
    pub fn from_sources(
        file_content: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match file_content {
            Some(content) => toml::from_str::<Config>(content)?,
            None => Config::default(),
        };

        if let Some(api_key) = env("OPENAI_API_KEY").and_then(non_empty) {
            config.api_key = Some(api_key);
        }
        if let Some(api_base) = env("OPENAI_API_BASE").and_then(non_empty) {
            config.api_base = api_base;
        }
        if let Some(assistant_id) = env("ASSIS_ID").and_then(non_empty) {
            config.assistant_id = Some(assistant_id);
        }
        if let Some(thread_id) = env("THREAD_ID").and_then(non_empty) {
            config.thread_id = Some(thread_id);
        }
        if let Some(model) = env("MODEL").and_then(non_empty) {
            config.model = Some(model);
        }
        if let Some(http_proxy) = env("HTTP_PROXY") {
            config.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = env("HTTPS_PROXY") {
            config.https_proxy = https_proxy;
        }
        if let Some(v) = env("STUDY_POLL_INTERVAL_MS")
            .and_then(|v| parse_env_number("STUDY_POLL_INTERVAL_MS", &v))
        {
            config.poll_interval_ms = v;
        }
        if let Some(v) =
            env("STUDY_MAX_WAIT_SECS").and_then(|v| parse_env_number("STUDY_MAX_WAIT_SECS", &v))
        {
            config.max_wait_secs = v;
        }
        if let Some(v) = env("STUDY_UPLOAD_MAX_RETRIES")
            .and_then(|v| parse_env_number("STUDY_UPLOAD_MAX_RETRIES", &v))
        {
            config.upload_max_retries = v;
        }
        if let Some(dir) = env("STUDY_SCRATCH_DIR").and_then(non_empty) {
            config.scratch_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("api_key (OPENAI_API_KEY)"))
    }

    pub fn require_assistant_id(&self) -> Result<&str, ConfigError> {
        self.assistant_id
            .as_deref()
            .ok_or(ConfigError::Missing("assistant_id (ASSIS_ID)"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_wait(&self) -> Option<Duration> {
        if self.max_wait_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_wait_secs))
        }
    }
}
