//! Tracing initialization.
//!
//! Console logging only; export layers are a host-application concern.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing-subscriber with console output.
///
/// Respects `RUST_LOG`; defaults to INFO. Safe to call more than once
/// (subsequent calls are no-ops).
pub fn init_logging() {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let fmt_layer = tracing_subscriber::fmt::layer();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
