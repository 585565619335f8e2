mod auth;
mod routes;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio::net::TcpListener;

use nassync::config::{load_config, resolve_config_path};
use nassync::logging::{init_logging, LoggingError};
use nassync::{ConfigError, SecretError, SyncError, SyncOptions, SyncOrchestrator};

use state::AppState;

/// Syncs PDF reports from a Synology NAS into the ingestion API.
#[derive(Debug, Parser)]
#[command(name = "nassync-server", version, about)]
struct Args {
    /// Path to the YAML config file. Falls back to NASSYNC_CONFIG.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run one sync, print the report as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Process at most N queued files (with --once).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,

    /// Override `server.bindAddress`.
    #[arg(long, env = "NASSYNC_BIND")]
    bind: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Failed to resolve API keys: {0}")]
    ApiKeys(#[from] SecretError),

    #[error("No API keys configured; set server.apiKeys, apiKeysFile or apiKeysEnvVar")]
    NoApiKeys,

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("nassync-server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, ServerError> {
    let config_path = resolve_config_path(args.config)?;
    let config = load_config(&config_path)?;
    init_logging(&config.logging)?;

    info!(
        "Starting nassync-server v{} with {}",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let orchestrator = Arc::new(SyncOrchestrator::from_config(&config)?);
    let shutdown = orchestrator.shutdown_handle();

    if args.once {
        tokio::spawn(watch_ctrl_c(Arc::clone(&shutdown)));
        let options = SyncOptions {
            batch_size: args.batch_size.and_then(|n| usize::try_from(n).ok()),
        };
        return run_once(&orchestrator, options).await;
    }

    let api_keys = config.server.resolve_api_keys()?;
    if api_keys.is_empty() {
        return Err(ServerError::NoApiKeys);
    }
    if args.batch_size.is_some() {
        warn!("--batch-size only applies with --once; use ?test_batch_size= on /sync");
    }

    let address = args.bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
    info!("Listening on {} ({} API keys)", address, api_keys.len());

    let app = routes::router(AppState::new(orchestrator, api_keys));
    axum::serve(listener, app)
        .with_graceful_shutdown(watch_ctrl_c(shutdown))
        .await
        .map_err(ServerError::Serve)?;

    info!("nassync-server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn run_once(
    orchestrator: &Arc<SyncOrchestrator>,
    options: SyncOptions,
) -> Result<ExitCode, ServerError> {
    match orchestrator.run_detached(options).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            let body = serde_json::json!({
                "success": false,
                "message": e.to_string(),
                "error_code": e.error_code(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Resolves on ctrl-c after raising the shutdown flag, so an active run
/// stops after its current item.
async fn watch_ctrl_c(shutdown: Arc<AtomicBool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, shutting down");
            shutdown.store(true, Ordering::Relaxed);
        }
        Err(e) => error!("Failed to listen for ctrl-c: {}", e),
    }
}
