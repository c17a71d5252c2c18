//! Structured logging setup.
//!
//! Every crate logs through `tracing` macros with structured fields
//! (`claim_id`, `entity_id`, `key`, `attempt`). Binaries call
//! [`init_subscriber`] once at startup.

use tracing_subscriber::EnvFilter;

const FALLBACK_LEVEL: &str = "info";

/// Filter for `level`, or the `info` filter when `level` does not parse.
///
/// Returns the rejected directive alongside so the caller can report it once
/// a subscriber exists.
fn level_filter(level: &str) -> (EnvFilter, Option<String>) {
    match EnvFilter::try_new(level) {
        Ok(filter) => (filter, None),
        Err(_) => (EnvFilter::new(FALLBACK_LEVEL), Some(level.to_owned())),
    }
}

/// Initialize the global tracing subscriber on stderr.
///
/// `RUST_LOG` takes precedence over `level` when set. With `json` the output
/// is one JSON object per line, otherwise the compact human format. An
/// unparseable `level` falls back to `info` with a warning.
/// Subsequent calls are no-ops.
pub fn init_subscriber(level: &str, json: bool) {
    let (filter, rejected) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, None),
        Err(_) => level_filter(level),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already set
    let installed = if json {
        builder.json().try_init().is_ok()
    } else {
        builder.compact().try_init().is_ok()
    };

    if installed {
        if let Some(level) = rejected {
            tracing::warn!(level, fallback = FALLBACK_LEVEL, "invalid log level, using fallback");
        }
        tracing::debug!(json, "tracing subscriber installed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
