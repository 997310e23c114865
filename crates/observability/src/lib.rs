//! Tracing/logging setup shared by every agora binary.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;

/// Initialize process-wide tracing with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize tracing with an explicit default level and output format.
///
/// `RUST_LOG`, when set, still wins over `default_level`.
pub fn init_with(default_level: &str, format: LogFormat) {
    tracing::init_with(default_level, format);
}
