//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG` when set, otherwise `info` globally and
/// `debug` for the ember crates.
///
/// # Example
/// ```
/// ember_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ember=debug,ember_rhi=debug,ember_renderer=debug"));

    // A second call (e.g. from several doctests in one process) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
