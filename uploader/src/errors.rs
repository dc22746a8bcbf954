use relay::relay::UploadResult;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for client-side upload operations
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("could not read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Transport(String),

    /// The relay answered but did not store the file.
    #[error("relay upload failed: {0}")]
    Relay(String),

    /// The file is stored in the channel but the backend has no record of it.
    #[error("uploaded as message {} but registration failed: {message}", .upload.message_id)]
    Registration {
        upload: UploadResult,
        message: String,
    },

    #[error("could not resolve download link: {0}")]
    DownloadLink(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}
