use super::{CredentialError, CredentialSource, Credentials};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

const CREDENTIALS_PATH: &str = "api/worker/credentials";

// Error body shape of the backend API, e.g. {"detail": "Telegram not fully configured"}
#[derive(Deserialize)]
struct BackendErrorBody {
    detail: Option<serde_json::Value>,
}

/// Fetches credentials from the backend on behalf of the user owning the auth token.
pub struct BackendCredentialSource {
    client: reqwest::Client,
    url: Url,
}

impl BackendCredentialSource {
    pub fn new(backend_url: &Url) -> Result<Self, url::ParseError> {
        let url = Url::parse(&format!(
            "{}/{}",
            backend_url.as_str().trim_end_matches('/'),
            CREDENTIALS_PATH
        ))?;

        Ok(BackendCredentialSource {
            client: reqwest::Client::new(),
            url,
        })
    }
}

#[async_trait]
impl CredentialSource for BackendCredentialSource {
    async fn fetch(&self, auth_token: &str) -> Result<Credentials, CredentialError> {
        let response = self
            .client
            .get(self.url.clone())
            .bearer_auth(auth_token)
            .send()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<BackendErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .map(|detail| match detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });

            return Err(CredentialError::Rejected { status, detail });
        }

        response
            .json::<Credentials>()
            .await
            .map_err(|e| CredentialError::InvalidPayload(e.to_string()))
    }
}
