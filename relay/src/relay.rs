use crate::credentials::CredentialResolver;
use crate::errors::{RelayError, Result};
use crate::metrics_defs::{
    UPLOAD_BYTES, UPLOAD_DURATION, UPLOAD_FAILED, UPLOAD_REJECTED, UPLOAD_REQUESTS, UPLOAD_SUCCESS,
};
use crate::telegram::{DocumentSender, OutgoingDocument, SendDocumentResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared::timed_cache::epoch_millis;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// File name used when neither the form nor the file part names the upload.
const FALLBACK_FILE_NAME: &str = "file";

/// The `file` part of an upload form.
///
/// `size` counts every byte the client sent. Parts larger than the relay's
/// limit are drained without being buffered, so `data` is empty for them.
#[derive(Clone, Debug, Default)]
pub struct FilePart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
    pub data: Bytes,
}

/// Fields extracted from an upload form, before validation. Empty text values
/// are stored as `None`.
#[derive(Clone, Debug, Default)]
pub struct UploadForm {
    pub file: Option<FilePart>,
    pub subject_id: Option<String>,
    pub auth_token: Option<String>,
    pub file_name: Option<String>,
}

/// An upload that passed validation.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub payload: Bytes,
    pub content_type: Option<String>,
    pub declared_file_name: String,
    pub subject_id: Option<String>,
    pub auth_token: String,
}

/// What the client learns about a stored upload, whatever media kind Telegram
/// filed it under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub message_id: i64,
    pub file_id: String,
    pub file_name: String,
}

/// Validates upload forms, forwards them into the subject's channel and
/// normalizes Telegram's reply.
///
/// The relay does not tell the backend about the stored file; the client
/// registers the metadata once it has the result.
pub struct UploadRelay {
    credentials: Arc<dyn CredentialResolver>,
    sender: Arc<dyn DocumentSender>,
    max_upload_size: u64,
}

impl UploadRelay {
    pub fn new(
        credentials: Arc<dyn CredentialResolver>,
        sender: Arc<dyn DocumentSender>,
        max_upload_size: u64,
    ) -> Self {
        UploadRelay {
            credentials,
            sender,
            max_upload_size,
        }
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    pub async fn handle(&self, form: UploadForm) -> Result<UploadResult> {
        counter!(UPLOAD_REQUESTS).increment(1);

        let result = match self.validate(form) {
            Ok(request) => self.forward(request).await,
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            record_error(err);
        }

        result
    }

    /// Accounts for a request that failed before it produced a form, such as a
    /// wrong method or an unreadable multipart body.
    pub fn reject(&self, err: RelayError) -> RelayError {
        counter!(UPLOAD_REQUESTS).increment(1);
        record_error(&err);
        err
    }

    /// Checks, in order: a file is present, an auth token is present, the file
    /// fits the size limit.
    pub fn validate(&self, form: UploadForm) -> Result<UploadRequest> {
        let file = form.file.ok_or(RelayError::MissingFile)?;
        let auth_token = form.auth_token.ok_or(RelayError::MissingAuthToken)?;

        if file.size > self.max_upload_size {
            return Err(RelayError::FileTooLarge {
                size: file.size,
                max_size: self.max_upload_size,
            });
        }

        let declared_file_name = form
            .file_name
            .or(file.file_name)
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

        Ok(UploadRequest {
            payload: file.data,
            content_type: file.content_type,
            declared_file_name,
            subject_id: form.subject_id,
            auth_token,
        })
    }

    async fn forward(&self, request: UploadRequest) -> Result<UploadResult> {
        let started = Instant::now();
        let size = request.payload.len();

        let credentials = self
            .credentials
            .resolve(
                request.subject_id.as_deref(),
                &request.auth_token,
                epoch_millis(),
            )
            .await?;

        tracing::debug!(
            subject_id = request.subject_id.as_deref().unwrap_or_default(),
            file_name = %request.declared_file_name,
            size,
            "Forwarding upload"
        );

        let document = OutgoingDocument {
            caption: format!("Uploaded: {}", request.declared_file_name),
            file_name: request.declared_file_name.clone(),
            content_type: request.content_type,
            data: request.payload,
        };
        let response = self.sender.send_document(&credentials, document).await?;
        let result = normalize(response, request.declared_file_name)?;

        counter!(UPLOAD_SUCCESS).increment(1);
        histogram!(UPLOAD_BYTES).record(size as f64);
        histogram!(UPLOAD_DURATION).record(started.elapsed().as_secs_f64());
        tracing::info!(
            message_id = result.message_id,
            file_name = %result.file_name,
            size,
            "Upload stored"
        );

        Ok(result)
    }
}

fn record_error(err: &RelayError) {
    if err.is_rejection() {
        counter!(UPLOAD_REJECTED, "reason" => err.reason()).increment(1);
        tracing::info!(reason = err.reason(), error = %err, "Upload rejected");
    } else {
        counter!(UPLOAD_FAILED, "reason" => err.reason()).increment(1);
        tracing::warn!(reason = err.reason(), error = %err, "Upload failed");
    }
}

/// Turns Telegram's reply into the stable result, or the error the client
/// should see.
pub fn normalize(response: SendDocumentResponse, file_name: String) -> Result<UploadResult> {
    if !response.ok {
        return Err(RelayError::UpstreamUpload(
            response
                .description
                .unwrap_or_else(|| "Telegram upload failed".to_string()),
        ));
    }

    let message = response.result.ok_or(RelayError::MissingFileId)?;
    let message_id = message.message_id.ok_or(RelayError::MissingFileId)?;
    let file_id = message
        .attachment
        .as_ref()
        .and_then(|attachment| attachment.file_id())
        .ok_or(RelayError::MissingFileId)?
        .to_string();

    Ok(UploadResult {
        message_id,
        file_id,
        file_name,
    })
}
