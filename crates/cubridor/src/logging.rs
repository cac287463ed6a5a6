//! Logging setup for the CLI.
//!
//! The library only emits `tracing` events; this module installs the
//! subscriber. `RUST_LOG` wins over the `-v`/`-q` flags when set.

use crate::config::{CliConfig, Verbosity};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity level
#[must_use]
pub const fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "cubrir=debug,cubridor=debug,info",
        Verbosity::Debug => "trace",
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config.verbosity)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(config.color.should_color())
                    .with_target(false)
                    .compact(),
            )
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives() {
        assert_eq!(default_directive(Verbosity::Quiet), "error");
        assert_eq!(default_directive(Verbosity::Normal), "info");
        assert!(default_directive(Verbosity::Verbose).contains("cubrir=debug"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = CliConfig::new();
        init_logging(&config);
        init_logging(&config);
    }
}
