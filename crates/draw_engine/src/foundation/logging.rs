//! Logging setup on top of the `log` facade

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging unless a logger is already installed.
///
/// Returns false when another logger was installed first.
pub fn try_init() -> bool {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
