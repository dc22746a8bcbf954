//! Upload relay: accepts multipart uploads from browsers, resolves the
//! uploader's Telegram credentials and forwards the file into their channel.

pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod metrics_defs;
pub mod relay;
pub mod telegram;
#[cfg(test)]
mod testutils;

use credentials::{BackendCredentialSource, CredentialProvider};
use relay::UploadRelay;
use shared::admin_service::{AdminProbe, AdminService};
use shared::http::run_http_service;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use telegram::TelegramClient;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid relay config: {0}")]
    Config(#[from] config::ValidationError),
    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Backs the admin listener: ready once the upload listener is bound.
struct RelayProbe {
    ready: AtomicBool,
    provider: Arc<CredentialProvider>,
    max_upload_size: u64,
}

impl AdminProbe for RelayProbe {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "cached_subjects": self.provider.cached_subjects(),
            "max_upload_size": self.max_upload_size,
        })
    }
}

/// Runs the upload listener and the admin listener until either fails.
pub async fn run(config: config::Config) -> Result<(), ServeError> {
    config.validate()?;

    let source = BackendCredentialSource::new(&config.backend_url)?;
    let provider = Arc::new(CredentialProvider::new(
        Arc::new(source),
        config.credential_cache.ttl_ms(),
        config.credential_cache.max_entries,
    ));
    let sender = TelegramClient::new(config.telegram.api_base_url());
    let relay = Arc::new(UploadRelay::new(
        provider.clone(),
        Arc::new(sender),
        config.max_upload_size,
    ));

    let probe = Arc::new(RelayProbe {
        ready: AtomicBool::new(false),
        provider,
        max_upload_size: config.max_upload_size,
    });

    let listener = TcpListener::bind(config.listener.address()).await?;
    tracing::info!(address = %config.listener.address(), "Upload relay listening");
    probe.ready.store(true, Ordering::Relaxed);

    let relay_task = async {
        axum::serve(listener, api::router(relay)).await?;
        Ok::<(), ServeError>(())
    };
    let admin_task = async {
        run_http_service(
            &config.admin_listener.host,
            config.admin_listener.port,
            AdminService::new(probe.clone()),
        )
        .await?;
        Ok::<(), ServeError>(())
    };

    tokio::try_join!(relay_task, admin_task)?;
    Ok(())
}
