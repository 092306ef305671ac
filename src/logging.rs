//! Logging setup for the `leasehold` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary. Output goes to stderr so that stdout stays reserved for
//! command output and lock notifications.
//!
//! `RUST_LOG` takes precedence over the default level when set.

use crate::error::{LeaseError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "leasehold=info";

/// Filter used with `--verbose` when `RUST_LOG` is unset.
pub const VERBOSE_FILTER: &str = "leasehold=debug";

/// Build the stderr filter for the given verbosity.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_thread_names(verbose)
        .with_filter(env_filter(verbose));

    Registry::default()
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LeaseError::UserError(format!("failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_filter_when_rust_log_unset() {
        // SAFETY: serialized with every other test touching RUST_LOG.
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(env_filter(false).to_string(), DEFAULT_FILTER);
        assert_eq!(env_filter(true).to_string(), VERBOSE_FILTER);
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_default() {
        // SAFETY: serialized with every other test touching RUST_LOG.
        unsafe { std::env::set_var("RUST_LOG", "leasehold=trace") };
        let filter = env_filter(false).to_string();
        unsafe { std::env::remove_var("RUST_LOG") };

        assert_eq!(filter, "leasehold=trace");
    }
}
