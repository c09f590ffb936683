//! Logging setup for the `stagegate` binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Route `tracing` output to stderr as JSON lines or plain text.
///
/// `RUST_LOG` takes precedence over `level`. Only the first call in a
/// process installs a subscriber; stdout is left to run summaries.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let (json_lines, text_lines) = if json {
        (Some(fmt::layer().with_target(false).with_writer(std::io::stderr).json()), None)
    } else {
        (None, Some(fmt::layer().with_target(false).with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_lines)
        .with(text_lines)
        .try_init()
        .ok();
}
