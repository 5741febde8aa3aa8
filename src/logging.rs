//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! The filter comes from `STAKEFLOW_LOG`, then `RUST_LOG`, then the default
//! passed by the caller. Logs go to stderr.

use tracing_subscriber::EnvFilter;

use crate::config::EnvLookup;

/// Filter used when neither variable is set.
pub const DEFAULT_FILTER: &str = "info";

const FILTER_VARS: [&str; 2] = ["STAKEFLOW_LOG", "RUST_LOG"];

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed, so repeated
/// calls are harmless.
#[must_use]
pub fn init(default_filter: &str) -> bool {
    let directive = filter_directive(&crate::config::process_env, default_filter);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Picks the first non-empty filter variable, or `default_filter`.
#[must_use]
pub fn filter_directive(lookup: &EnvLookup<'_>, default_filter: &str) -> String {
    FILTER_VARS
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_filter.to_owned())
}
