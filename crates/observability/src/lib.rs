//! Tracing/logging setup shared by the binaries.

pub mod subscriber;

pub use subscriber::{LogConfig, LogFormat, ParseLogFormatError};

/// Initialize process-wide logging from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init(&LogConfig::from_env());
}
