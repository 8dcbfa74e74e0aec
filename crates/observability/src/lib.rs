//! Process-wide logging setup for services embedding the pipeline.

/// Structured log initialization.
pub mod logging;

/// Initialize process-wide logging with the default `info` filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init(logging::DEFAULT_DIRECTIVE);
}
