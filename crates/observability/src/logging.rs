//! JSON logs filtered through `RUST_LOG`.
//!
//! Pipeline events worth knowing about:
//!
//! - `error`: CSRF rejections, static read failures, commit/rollback failures
//! - `warn`: path traversal attempts, rollbacks, unresolvable redirect targets
//! - `debug`: session resolution misses, guard redirects, static hits

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter: `RUST_LOG` first, `fallback` otherwise.
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the JSON subscriber.
///
/// Returns `false` when a global subscriber was already installed (by an
/// earlier call or by the host application).
pub fn init(fallback: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}
