use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing::Dispatch;
use tracing_subscriber::fmt::{time::ChronoUtc, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// `RUST_LOG` wins over the configured level when set
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Build the logging dispatcher without installing it
///
/// JSON records carry an RFC 3339 UTC `timestamp` and the fields of the
/// current span, which is where the request trace ends up.
pub fn build_dispatch<W>(config: &LoggingConfig, filter: EnvFilter, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let use_console = config.console || config.format == "console";

    if use_console {
        // Pretty console output for development/debug
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
            );
        Dispatch::new(subscriber)
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
            );
        Dispatch::new(subscriber)
    }
}

/// Install the process-wide logger writing to stdout. Call once at startup.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let dispatch = build_dispatch(config, env_filter(config), std::io::stdout);
    tracing::dispatcher::set_global_default(dispatch)
        .context("Failed to install global tracing subscriber")?;
    Ok(())
}
