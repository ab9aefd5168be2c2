//! Tracing initialisation for hivesync binaries.
//!
//! [`init_tracing`] configures the global subscriber once per process;
//! later calls are ignored. Filtering follows `HIVESYNC_LOG` when set,
//! then `RUST_LOG`, then the supplied default level.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter(default_level: Level) -> EnvFilter {
    if let Ok(directives) = std::env::var("HIVESYNC_LOG") {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

/// Initialise the global tracing subscriber.
///
/// * `json` — when `true`, emit newline-delimited JSON log lines for
///   aggregation pipelines; plain formatting otherwise.
/// * `level` — default verbosity when neither `HIVESYNC_LOG` nor
///   `RUST_LOG` is set.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
