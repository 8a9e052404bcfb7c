//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`, leaving stdout for the case
//! output the operator follows (`OUT:` lines, return values, prompts).
//! `RUST_LOG` overrides the default filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "shardcheck=info,warn";

/// Filter used when `RUST_LOG` is unset and `--verbose` is given.
pub const VERBOSE_FILTER: &str = "shardcheck=debug,info";

/// Returns the fallback filter directive for the requested verbosity.
#[must_use]
pub const fn default_directive(verbose: bool) -> &'static str {
    if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }
}

/// Installs the global subscriber.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .ok();
}
