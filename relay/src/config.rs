use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Largest payload the destination platform accepts for a bot upload.
pub const MAX_UPLOAD_SIZE: u64 = 2 * 1024 * 1024 * 1024;

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener both bind {0}")]
    ListenerConflict(String),

    #[error("Credential cache TTL cannot be 0")]
    ZeroCacheTtl,

    #[error("Credential cache must hold at least one entry")]
    ZeroCacheCapacity,

    #[error("Maximum upload size cannot be 0")]
    ZeroUploadLimit,
}

/// Upload relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for upload requests
    #[serde(default = "Listener::default_relay")]
    pub listener: Listener,
    /// Listener for health, readiness and status endpoints
    #[serde(default = "Listener::default_admin")]
    pub admin_listener: Listener,
    /// Base URL of the backend that issues per-user credentials
    pub backend_url: Url,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Uploads larger than this are rejected before any credential lookup
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    #[serde(default)]
    pub credential_cache: CredentialCacheConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(self.listener.address()));
        }

        if self.max_upload_size == 0 {
            return Err(ValidationError::ZeroUploadLimit);
        }

        self.credential_cache.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    fn default_relay() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }

    fn default_admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TelegramConfig {
    /// Bot API root; the bot token and method name are appended per request
    #[serde(default)]
    pub api_base_url: Option<Url>,
}

impl TelegramConfig {
    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_ref()
            .map_or(DEFAULT_TELEGRAM_API_URL, Url::as_str)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CredentialCacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl CredentialCacheConfig {
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_secs.saturating_mul(1000)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_secs == 0 {
            return Err(ValidationError::ZeroCacheTtl);
        }
        if self.max_entries == 0 {
            return Err(ValidationError::ZeroCacheCapacity);
        }
        Ok(())
    }
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        CredentialCacheConfig {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

fn default_max_upload_size() -> u64 {
    MAX_UPLOAD_SIZE
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}
