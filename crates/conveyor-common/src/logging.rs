// Process-wide tracing subscriber setup.

use crate::config::EngineSettings;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Filter precedence: `settings.log_filter`, then `RUST_LOG`, then `info`
/// (`debug` when `settings.debug` is set). Safe to call more than once; only the
/// first call installs anything. Returns whether this call installed it.
pub fn init(settings: &EngineSettings) -> bool {
    let default_level = if settings.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = match settings.log_filter.as_deref() {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::from_default_env().add_directive(default_level.into()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
