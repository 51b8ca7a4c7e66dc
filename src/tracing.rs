//! Structured logging setup
//!
//! Logs go to stderr, either as human readable lines or as one JSON object
//! per line for log collectors:
//!
//! ```text
//! bpf-recorder ──► fmt layer  (--log-format text)
//!              └─► json layer (--log-format json)
//! ```
//!
//! The level filter comes from `RUST_LOG` and defaults to
//! `info,bpfrecorder=debug`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info,bpfrecorder=debug";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// # Example
/// ```ignore
/// init_tracing(LogFormat::Json)?;
/// ```
pub fn init_tracing(
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = tracing_subscriber::registry().with(filter());

    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        format = ?format,
        "Logging initialized"
    );
    Ok(())
}
