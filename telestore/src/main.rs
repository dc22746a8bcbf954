mod config;
mod logging;
mod metrics;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use std::path::PathBuf;
use std::process;
use uploader::{DownloadLinks, UploadAdapter, UploadOptions};

#[derive(Parser)]
#[command(name = "telestore", about = "TeleStore upload relay and client")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short, env = "TELESTORE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the upload relay and its admin listener
    Relay,
    /// Upload one local file through the relay and register it
    Upload(UploadArgs),
    /// Print a download link for a stored file
    Link(LinkArgs),
}

#[derive(Args)]
struct UploadArgs {
    path: PathBuf,
    #[arg(long, env = "TELESTORE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: String,
    #[arg(long)]
    subject_id: Option<String>,
    #[arg(long)]
    folder_id: Option<String>,
    /// Name to store the file under instead of the local file name
    #[arg(long)]
    file_name: Option<String>,
}

#[derive(Args)]
struct LinkArgs {
    file_id: String,
    #[arg(long, env = "TELESTORE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: String,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("config has no `{0}` section")]
    MissingSection(&'static str),
    #[error(transparent)]
    RelayConfig(#[from] relay::config::ValidationError),
    #[error(transparent)]
    UploaderConfig(#[from] uploader::config::ValidationError),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Metrics(#[from] metrics::MetricsError),
    #[error(transparent)]
    Serve(#[from] relay::ServeError),
    #[error(transparent)]
    Upload(#[from] uploader::errors::UploadError),
    #[error("could not encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let _sentry = logging::init(config.common.logging.as_ref());

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(error = %e, "telestore exited with an error");
        eprintln!("{e}");
        process::exit(1);
    }
}

async fn run(command: CliCommand, config: Config) -> Result<(), CliError> {
    match command {
        CliCommand::Relay => {
            let relay_config = config.relay.ok_or(CliError::MissingSection("relay"))?;
            relay_config.validate()?;
            if let Some(metrics_config) = &config.common.metrics {
                metrics::init(metrics_config)?;
            }

            tracing::info!("Starting relay");
            relay::run(relay_config).await?;
        }
        CliCommand::Upload(args) => {
            let uploader_config = config.uploader.ok_or(CliError::MissingSection("uploader"))?;
            uploader_config.validate()?;

            let adapter = UploadAdapter::new(uploader_config.relay_url, &uploader_config.backend_url)?;
            let options = UploadOptions {
                auth_token: args.auth_token,
                subject_id: args.subject_id,
                folder_id: args.folder_id,
                file_name: args.file_name,
            };
            let record = adapter.upload_file(&args.path, &options).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        CliCommand::Link(args) => {
            let uploader_config = config.uploader.ok_or(CliError::MissingSection("uploader"))?;
            uploader_config.validate()?;

            let backend_url = uploader_config.backend_url.clone();
            let ttl_ms = uploader_config.download_link_ttl_ms();
            let max_entries = uploader_config.max_cached_links;
            let links = match uploader_config.link_cache_path() {
                Some(path) => DownloadLinks::open(backend_url, ttl_ms, max_entries, path).await,
                None => DownloadLinks::new(backend_url, ttl_ms, max_entries),
            };
            println!("{}", links.get(&args.file_id, &args.auth_token).await?);
        }
    }

    Ok(())
}
