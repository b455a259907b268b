//! Configuration system (layered: code > env > TOML file).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};
use crate::session::DEFAULT_REQUEST_TIMEOUT;
use crate::storage::FileStoreConfig;
use crate::store::{StoreConfig, DEFAULT_MAX_CONVERSATIONS, DEFAULT_MAX_MESSAGES};
use crate::util::timeout::whole_millis;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Runtime settings for the chat core.
///
/// Resolution order, highest first:
/// 1. Values set in code after loading
/// 2. Environment variables (`PARLEY_*`, `.env` honoured)
/// 3. A TOML file passed to [`ParleyConfig::load`]
/// 4. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParleyConfig {
    /// Base URL of the chat-completion service; requests go to `{base}/chat`.
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub max_conversations: usize,
    pub max_messages_per_conversation: usize,
    /// Directory for the file-backed store. Platform data dir when unset.
    pub data_dir: Option<PathBuf>,
    /// Quiet period before snapshot notification of message updates.
    pub notify_debounce_ms: Option<u64>,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: whole_millis(DEFAULT_REQUEST_TIMEOUT),
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            max_messages_per_conversation: DEFAULT_MAX_MESSAGES,
            data_dir: None,
            notify_debounce_ms: None,
        }
    }
}

impl ParleyConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Read a TOML file. Returns defaults if the file does not exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        let config: Self = toml::from_str(&raw).map_err(|e| {
            ParleyError::Configuration(format!("Invalid config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// File (if given) overlaid with environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay values from `lookup`, which maps a variable name to its value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("PARLEY_API_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup("PARLEY_TIMEOUT_MS") {
            self.request_timeout_ms = parse_var("PARLEY_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("PARLEY_MAX_CONVERSATIONS") {
            self.max_conversations = parse_var("PARLEY_MAX_CONVERSATIONS", &raw)?;
        }
        if let Some(raw) = lookup("PARLEY_MAX_MESSAGES") {
            self.max_messages_per_conversation = parse_var("PARLEY_MAX_MESSAGES", &raw)?;
        }
        if let Some(dir) = lookup("PARLEY_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("PARLEY_NOTIFY_DEBOUNCE_MS") {
            self.notify_debounce_ms = Some(parse_var("PARLEY_NOTIFY_DEBOUNCE_MS", &raw)?);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_conversations == 0 {
            return Err(ParleyError::Configuration(
                "max_conversations must be at least 1".into(),
            ));
        }
        if self.max_messages_per_conversation == 0 {
            return Err(ParleyError::Configuration(
                "max_messages_per_conversation must be at least 1".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ParleyError::Configuration(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ParleyError::Configuration("api_base_url is empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(FileStoreConfig::default_dir)
    }

    /// Store limits derived from this configuration.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::builder()
            .max_conversations(self.max_conversations)
            .max_messages_per_conversation(self.max_messages_per_conversation)
            .maybe_notify_debounce(self.notify_debounce_ms.map(Duration::from_millis))
            .build()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ParleyError::Configuration(format!("{name}={raw:?} is invalid: {e}")))
}
