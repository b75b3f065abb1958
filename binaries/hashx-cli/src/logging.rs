use std::io;

use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Logs to stderr, stdout only carries command output.
pub fn init_logging(config: &Config) {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(config.tracing.level);

    tracing_subscriber::registry().with(stderr_layer).init();
}
