//! Structured logging initialisation.
//!
//! The filter level can be overridden at runtime via the `RUST_LOG`
//! environment variable; otherwise `--verbose` selects `debug`, and the
//! default is `info`.

use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been set (i.e. this function
/// was called twice in the same process).
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
