use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Returns false when a subscriber
/// was already installed, so repeated calls from tests are harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .compact();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(target: "logging", "Tracing initialized with default filter '{}'", default_filter);
    }
    installed
}

pub fn init_from_config(config: &LoggingConfig) -> bool {
    init_tracing(&config.filter)
}

/// Log a session lifecycle step against a table or view handle
#[macro_export]
macro_rules! trace_lifecycle {
    ($op:expr, $id:expr) => {
        tracing::debug!(target: "session", "{} {}", $op, $id);
    };
}
