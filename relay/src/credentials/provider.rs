use super::{CredentialCache, CredentialError, Credentials};
use crate::metrics_defs::{CREDENTIALS_FETCH_FAILURE, CREDENTIALS_STALE_FALLBACK};
use async_trait::async_trait;
use shared::counter;
use std::sync::Arc;

/// Where credentials come from when the cache cannot answer.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self, auth_token: &str) -> Result<Credentials, CredentialError>;
}

/// Resolves the credentials an upload should be sent with.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        subject_id: Option<&str>,
        auth_token: &str,
        now_ms: u64,
    ) -> Result<Credentials, CredentialError>;
}

/// Resolves credentials from the cache, then the source, then stale cache data.
///
/// A fresh cache entry is returned without contacting the source. When the
/// source fails, an expired entry for the same subject is still returned; only
/// a subject with no cached data at all turns a fetch failure into an error.
/// Requests without a subject are never cached and never fall back.
pub struct CredentialProvider {
    cache: CredentialCache,
    source: Arc<dyn CredentialSource>,
    ttl_ms: u64,
}

impl CredentialProvider {
    pub fn new(source: Arc<dyn CredentialSource>, ttl_ms: u64, max_entries: usize) -> Self {
        CredentialProvider {
            cache: CredentialCache::new(max_entries),
            source,
            ttl_ms,
        }
    }

    pub fn cached_subjects(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl CredentialResolver for CredentialProvider {
    async fn resolve(
        &self,
        subject_id: Option<&str>,
        auth_token: &str,
        now_ms: u64,
    ) -> Result<Credentials, CredentialError> {
        if let Some(subject) = subject_id
            && let Some(credentials) = self.cache.get(subject, self.ttl_ms, now_ms)
        {
            return Ok(credentials);
        }

        match self.source.fetch(auth_token).await {
            Ok(credentials) => {
                if let Some(subject) = subject_id {
                    self.cache.put(subject, credentials.clone(), now_ms);
                }
                Ok(credentials)
            }
            Err(err) => {
                counter!(CREDENTIALS_FETCH_FAILURE).increment(1);

                let stale = subject_id.and_then(|subject| self.cache.get_stale(subject));
                match stale {
                    Some(credentials) => {
                        tracing::warn!(
                            subject_id = subject_id.unwrap_or_default(),
                            error = %err,
                            "Using expired credentials due to fetch error"
                        );
                        counter!(CREDENTIALS_STALE_FALLBACK).increment(1);
                        Ok(credentials)
                    }
                    None => {
                        tracing::error!(error = %err, "Credential fetch failed with no cached fallback");
                        Err(err)
                    }
                }
            }
        }
    }
}
