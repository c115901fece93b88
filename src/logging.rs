// Logging setup shared by the CLI and the server

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` forces `debug`, else the
/// configured level is used. Calling this twice is harmless.
pub fn init(config_level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { config_level };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
