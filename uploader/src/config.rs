use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

const DEFAULT_LINK_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_CACHED_LINKS: usize = 1024;
const LINK_CACHE_FILE: &str = "download_links.json";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Download link TTL cannot be 0")]
    ZeroLinkTtl,
}

/// Client side configuration: where the relay and the backend live.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub relay_url: Url,
    pub backend_url: Url,
    #[serde(default = "default_link_ttl_secs")]
    pub download_link_ttl_secs: u64,
    #[serde(default = "default_max_cached_links")]
    pub max_cached_links: usize,
    /// Where resolved download links are kept between runs. Defaults to the
    /// platform cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.download_link_ttl_secs == 0 {
            return Err(ValidationError::ZeroLinkTtl);
        }
        Ok(())
    }

    pub fn download_link_ttl_ms(&self) -> u64 {
        self.download_link_ttl_secs.saturating_mul(1000)
    }

    /// `None` when no cache directory is configured and the platform has none.
    pub fn link_cache_path(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("telestore")))
            .map(|dir| dir.join(LINK_CACHE_FILE))
    }
}

fn default_link_ttl_secs() -> u64 {
    DEFAULT_LINK_TTL_SECS
}

fn default_max_cached_links() -> usize {
    DEFAULT_MAX_CACHED_LINKS
}
