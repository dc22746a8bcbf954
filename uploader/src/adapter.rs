use crate::errors::{Result, UploadError};
use relay::relay::UploadResult;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

const FILES_PATH: &str = "api/files";

/// Per-upload parameters supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    pub auth_token: String,
    pub subject_id: Option<String>,
    pub folder_id: Option<String>,
    /// Overrides the local file name in both the channel caption and the record.
    pub file_name: Option<String>,
}

// Relay reply, success and error shapes merged
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    #[serde(default)]
    success: bool,
    message_id: Option<i64>,
    file_id: Option<String>,
    file_name: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct FileRegistration<'a> {
    name: &'a str,
    size: u64,
    mime_type: &'a str,
    telegram_msg_id: i64,
    telegram_file_id: &'a str,
    folder_id: Option<&'a str>,
    thumbnail_url: Option<&'a str>,
    thumbnail_provider: Option<&'a str>,
}

/// The backend's record of a stored file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFile {
    pub id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Uploads local files through the relay and registers them with the backend.
pub struct UploadAdapter {
    client: reqwest::Client,
    relay_url: Url,
    files_url: Url,
}

impl UploadAdapter {
    pub fn new(relay_url: Url, backend_url: &Url) -> std::result::Result<Self, url::ParseError> {
        let files_url = Url::parse(&format!(
            "{}/{}",
            backend_url.as_str().trim_end_matches('/'),
            FILES_PATH
        ))?;

        Ok(UploadAdapter {
            client: reqwest::Client::new(),
            relay_url,
            files_url,
        })
    }

    pub async fn upload_file(&self, path: &Path, options: &UploadOptions) -> Result<RegisteredFile> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;

        let file_name = match &options.file_name {
            Some(name) => name.clone(),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
        };
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let size = data.len() as u64;

        tracing::debug!(file_name = %file_name, size, mime_type = %mime_type, "Uploading file");

        let upload = self.send(&file_name, &mime_type, data, options).await?;
        self.register(upload, size, &mime_type, options).await
    }

    /// Posts the file to the relay and returns what it stored.
    pub async fn send(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<UploadResult> {
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", part)
            .text("authToken", options.auth_token.clone())
            .text("fileName", file_name.to_string());
        if let Some(subject_id) = &options.subject_id {
            form = form.text("subjectId", subject_id.clone());
        }

        let response = self
            .client
            .post(self.relay_url.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();

        // Error replies carry a JSON `error` too; fall back to the status if not
        let body = match response.json::<RelayResponse>().await {
            Ok(body) => body,
            Err(_) => return Err(UploadError::Relay(format!("relay returned HTTP {status}"))),
        };

        match body {
            RelayResponse {
                success: true,
                message_id: Some(message_id),
                file_id,
                file_name: stored_name,
                ..
            } if status.is_success() => Ok(UploadResult {
                message_id,
                file_id: file_id.unwrap_or_default(),
                file_name: stored_name.unwrap_or_else(|| file_name.to_string()),
            }),
            RelayResponse { error, .. } => Err(UploadError::Relay(
                error.unwrap_or_else(|| "Failed to get message ID from relay".to_string()),
            )),
        }
    }

    async fn register(
        &self,
        upload: UploadResult,
        size: u64,
        mime_type: &str,
        options: &UploadOptions,
    ) -> Result<RegisteredFile> {
        let registration = FileRegistration {
            name: &upload.file_name,
            size,
            mime_type,
            telegram_msg_id: upload.message_id,
            telegram_file_id: &upload.file_id,
            folder_id: options.folder_id.as_deref(),
            thumbnail_url: None,
            thumbnail_provider: None,
        };

        let result: reqwest::Result<RegisteredFile> = async {
            self.client
                .post(self.files_url.clone())
                .bearer_auth(&options.auth_token)
                .json(&registration)
                .send()
                .await?
                .error_for_status()?
                .json::<RegisteredFile>()
                .await
        }
        .await;

        match result {
            Ok(record) => {
                tracing::info!(id = %record.id, message_id = upload.message_id, "File registered");
                Ok(record)
            }
            Err(err) => {
                tracing::error!(
                    message_id = upload.message_id,
                    error = %err,
                    "File stored but registration failed"
                );
                Err(UploadError::Registration {
                    message: err.to_string(),
                    upload,
                })
            }
        }
    }
}
