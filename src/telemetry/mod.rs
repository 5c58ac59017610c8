//! # Telemetry Module
//!
//! Structured logging setup. Every component logs through `tracing`; this
//! module only installs a subscriber for binaries and tests that want output.
//!
//! Library code never calls these functions on its own, so embedding
//! applications keep full control of their subscriber.
//!
//! | Target | Events |
//! |--------|--------|
//! | `analysis_cache::cache` | evictions, sweeps, decode failures |
//! | `analysis_cache::pool` | handle creation, discards, acquire timeouts |
//! | `analysis_cache::retrieval` | cache hits/misses, store errors, fallbacks |
//! | `analysis_cache::batch` | batch completion, task panics |

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "ANALYSIS_CACHE_LOG";

/// Filter used when [`LOG_ENV`] is unset or unparsable.
pub const DEFAULT_FILTER: &str = "analysis_cache=info";

static INIT: Once = Once::new();

/// Install a global subscriber filtered by `ANALYSIS_CACHE_LOG`.
///
/// Format: `ANALYSIS_CACHE_LOG=analysis_cache::pool=debug,analysis_cache=warn`.
/// Idempotent; if another subscriber is already installed this is a no-op.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        install(filter);
    });
}

/// Same as [`init_tracing`] but with explicit directives, ignoring the environment.
pub fn init_tracing_with_filter(directives: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        install(filter);
    });
}

fn install(filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init();
}
