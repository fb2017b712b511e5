//! Log level parsing and subscriber installation.

use tracing::Level;

/// Map a host log level name to a tracing level.
///
/// TRACE, DEBUG, INFO, WARN and ERROR are matched case-insensitively.
/// Anything else, including FATAL, maps to ERROR.
pub fn parse_log_level(level: &str) -> Level {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Install a fmt subscriber at the given level.
///
/// # Returns
///
/// `true` if this call installed the subscriber, `false` if one was already
/// installed.
pub fn init(level: &str) -> bool {
    let level = parse_log_level(level);
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(%level, "Logging initialized");
    }
    installed
}
