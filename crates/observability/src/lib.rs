//! Tracing and logging (shared process setup).

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;

/// Initialize process-wide tracing with the given output format.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}
