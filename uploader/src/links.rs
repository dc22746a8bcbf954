use crate::errors::{Result, UploadError};
use serde::{Deserialize, Serialize};
use shared::timed_cache::{TimedCache, epoch_millis};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use url::Url;

#[derive(Deserialize)]
struct DownloadUrlResponse {
    download_url: String,
}

/// On-disk form of one cached link.
#[derive(Debug, Serialize, Deserialize)]
struct StoredLink {
    download_url: String,
    stored_at_ms: u64,
}

/// Resolves temporary download links for stored files and remembers them for
/// `ttl_ms`, so browsing the same files again does not hit the backend.
///
/// A resolver built with [`DownloadLinks::open`] keeps its links in a JSON file,
/// so separate runs of the CLI share them.
pub struct DownloadLinks {
    client: reqwest::Client,
    backend_url: Url,
    cache: TimedCache<String>,
    ttl_ms: u64,
    store: Option<PathBuf>,
}

impl DownloadLinks {
    pub fn new(backend_url: Url, ttl_ms: u64, max_entries: usize) -> Self {
        DownloadLinks {
            client: reqwest::Client::new(),
            backend_url,
            cache: TimedCache::new(max_entries),
            ttl_ms,
            store: None,
        }
    }

    /// Loads the links saved in `store`, dropping the ones that have expired.
    /// A missing or unreadable file starts an empty cache.
    pub async fn open(backend_url: Url, ttl_ms: u64, max_entries: usize, store: PathBuf) -> Self {
        Self::open_at(backend_url, ttl_ms, max_entries, store, epoch_millis()).await
    }

    pub async fn open_at(
        backend_url: Url,
        ttl_ms: u64,
        max_entries: usize,
        store: PathBuf,
        now_ms: u64,
    ) -> Self {
        let mut links = Self::new(backend_url, ttl_ms, max_entries);

        match tokio::fs::read(&store).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, StoredLink>>(&bytes) {
                Ok(stored) => {
                    for (file_id, link) in stored {
                        links
                            .cache
                            .insert(&file_id, link.download_url, link.stored_at_ms);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %store.display(), error = %e, "Ignoring corrupt link cache");
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %store.display(), error = %e, "Could not read link cache");
            }
        }

        let pruned = links.prune_expired_at(now_ms);
        tracing::debug!(pruned, cached = links.len(), "Loaded link cache");

        links.store = Some(store);
        links
    }

    pub async fn get(&self, file_id: &str, auth_token: &str) -> Result<String> {
        self.get_at(file_id, auth_token, epoch_millis()).await
    }

    pub async fn get_at(&self, file_id: &str, auth_token: &str, now_ms: u64) -> Result<String> {
        if let Some(url) = self.cache.get_fresh(file_id, self.ttl_ms, now_ms) {
            return Ok(url);
        }

        let response = self
            .client
            .get(self.endpoint(file_id)?)
            .bearer_auth(auth_token)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| UploadError::DownloadLink(e.to_string()))?
            .json::<DownloadUrlResponse>()
            .await
            .map_err(|e| UploadError::DownloadLink(e.to_string()))?;

        // Only successful lookups are cached
        self.cache.insert(file_id, response.download_url.clone(), now_ms);
        tracing::debug!(file_id, "Cached download link");
        self.save().await;

        Ok(response.download_url)
    }

    fn endpoint(&self, file_id: &str) -> Result<Url> {
        let mut endpoint = self.backend_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| {
                UploadError::DownloadLink(format!("{} cannot be a base URL", self.backend_url))
            })?
            .pop_if_empty()
            .extend(["api", "files", file_id, "download-url"]);
        Ok(endpoint)
    }

    // The link is already resolved, so a failed write only costs a lookup later.
    async fn save(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let stored: BTreeMap<String, StoredLink> = self
            .cache
            .entries()
            .into_iter()
            .map(|(file_id, entry)| {
                let link = StoredLink {
                    download_url: entry.value,
                    stored_at_ms: entry.stored_at_ms,
                };
                (file_id, link)
            })
            .collect();

        let result: std::io::Result<()> = async {
            if let Some(parent) = store.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let json = serde_json::to_vec(&stored)?;
            tokio::fs::write(store, json).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(path = %store.display(), error = %e, "Could not save link cache");
        }
    }

    /// Removes every link older than the TTL. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(epoch_millis())
    }

    pub fn prune_expired_at(&self, now_ms: u64) -> usize {
        self.cache.prune_expired(self.ttl_ms, now_ms)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
