use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Map the `-v` count to a log level
#[must_use]
pub const fn level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 | 2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn filter(verbosity: u8) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return EnvFilter::from_default_env();
    }

    let crate_level = level(verbosity);
    // -v only raises our own logs, -vv also opens up dependencies
    let directives = match verbosity {
        0 | 1 => format!("warn,{}={crate_level}", env!("CARGO_CRATE_NAME")),
        _ => crate_level.to_string(),
    };
    EnvFilter::new(directives)
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `verbosity`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(verbosity: u8) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(verbosity))
        .with(fmt::Layer::default().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
