use crate::credentials::CredentialError;
use http::StatusCode;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Every way a single upload can end without a stored file. None of these are
/// retried by the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid multipart body: {0}")]
    InvalidMultipart(String),

    #[error("No file provided")]
    MissingFile,

    #[error("Auth token required")]
    MissingAuthToken,

    #[error("File too large ({size} bytes, max {max_size} bytes)")]
    FileTooLarge { size: u64, max_size: u64 },

    #[error("Failed to fetch credentials: {0}")]
    CredentialFetch(#[from] CredentialError),

    /// Telegram answered with `ok: false`; carries its description verbatim.
    #[error("{0}")]
    UpstreamUpload(String),

    /// Telegram reported success but the message carries no usable file id.
    #[error("Failed to get file_id from Telegram response")]
    MissingFileId,

    #[error("Invalid response from Telegram: {0}")]
    InvalidUpstreamResponse(String),

    #[error("Telegram request failed: {0}")]
    Transport(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::InvalidMultipart(_)
            | RelayError::MissingFile
            | RelayError::MissingAuthToken => StatusCode::BAD_REQUEST,
            RelayError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::CredentialFetch(_)
            | RelayError::UpstreamUpload(_)
            | RelayError::MissingFileId
            | RelayError::InvalidUpstreamResponse(_)
            | RelayError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Rejections happen before any collaborator is contacted.
    pub fn is_rejection(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Stable label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed => "method_not_allowed",
            RelayError::InvalidMultipart(_) => "invalid_multipart",
            RelayError::MissingFile => "missing_file",
            RelayError::MissingAuthToken => "missing_auth",
            RelayError::FileTooLarge { .. } => "file_too_large",
            RelayError::CredentialFetch(_) => "credential_fetch",
            RelayError::UpstreamUpload(_) => "upstream_upload",
            RelayError::MissingFileId => "missing_file_id",
            RelayError::InvalidUpstreamResponse(_) => "invalid_upstream_response",
            RelayError::Transport(_) => "transport",
        }
    }
}
