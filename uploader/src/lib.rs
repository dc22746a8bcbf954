//! Client side of TeleStore uploads: sends local files through the relay,
//! registers them with the backend and resolves download links.

pub mod adapter;
pub mod config;
pub mod errors;
pub mod links;

pub use adapter::{RegisteredFile, UploadAdapter, UploadOptions};
pub use links::DownloadLinks;
