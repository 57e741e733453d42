//! Tracing subscriber setup for the divvy binary.
//!
//! Library crates (`divvy-base`, `divvy`) only ever emit `tracing` events; only the
//! binary installs a subscriber, and it does so exactly once, early in `main`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a stderr-writing subscriber.
///
/// The default filter is `info`, raised to `debug` by `verbose` and to `trace` by
/// `DIVVY_VERBOSE_TRACE` being set to any non-empty value; `RUST_LOG` always wins
/// over both when present, for ad hoc per-module overrides.
pub fn init(verbose: bool) {
    let default_directive = if std::env::var("DIVVY_VERBOSE_TRACE")
        .map(|v| !v.is_empty())
        .unwrap_or(false)
    {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
