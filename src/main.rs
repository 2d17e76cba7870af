use anyhow::{Context, Result};
use hammergen_users::core::config::Config;
use hammergen_users::core::startup::bootstrap_admin;
use hammergen_users::core::state::AppState;
use hammergen_users::core::tracing_init::init_tracing;
use hammergen_users::services::directory::UserDirectory;
use hammergen_users::services::email::HttpEmailSender;
use hammergen_users::stores::user_store::UserStore;
use hammergen_users::stores::wal_store::WalUserStore;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path)
        .context(format!(
            "Failed to load configuration from '{}'. \
            If this is your first run, copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        ))?;

    init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        num_threads = config.runtime.num_threads,
        wal_path = %config.storage.wal_path.display(),
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "User directory starting"
    );

    let store = WalUserStore::open(config.storage.wal_path.clone())?;

    if config.storage.compact_on_start {
        let kept = store.compact()?;
        info!(users = kept, "WAL compacted");
    }

    let mailer = Arc::new(HttpEmailSender::new(&config.email)?);
    let state = AppState::new(config, store, mailer)?;

    bootstrap_admin(state.directory.as_ref(), &state.config.bootstrap).await?;

    let shutdown = CancellationToken::new();
    let housekeeping = spawn_housekeeping_task(
        Arc::clone(&state.directory),
        state.config.housekeeping.interval_secs,
        shutdown.clone(),
    );

    info!(
        users = state.store.len(),
        housekeeping_interval_seconds = state.config.housekeeping.interval_secs,
        "User directory startup complete"
    );

    shutdown_signal().await;
    shutdown.cancel();

    if let Err(e) = housekeeping.await {
        error!(error = %e, "Housekeeping task failed");
    }

    match state.store.compact() {
        Ok(kept) => info!(users = kept, "WAL compacted on shutdown"),
        Err(e) => error!(error = %format!("{:#}", e), "Failed to compact WAL on shutdown"),
    }

    info!("Shutting down gracefully");

    Ok(())
}

/// Periodically drop expired reset tokens and stale throttle windows
fn spawn_housekeeping_task(
    directory: Arc<UserDirectory<WalUserStore>>,
    interval_secs: u64,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            debug!("Running housekeeping");
            let purged_resets = directory.purge_expired_resets();
            let expired_windows = directory.cleanup_throttle();

            if purged_resets > 0 || expired_windows > 0 {
                info!(purged_resets, expired_windows, "Housekeeping completed");
            } else {
                debug!("Housekeeping completed, nothing to purge");
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
