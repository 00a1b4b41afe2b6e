use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Target of every event emitted by the device drivers.
pub const DEVICE_TARGET: &str = "ptyserial::device";

/// Build the diagnostic filter.
///
/// `RUST_LOG` wins, then the `--log-level` override, then the config file.
/// The device verbosity is appended as its own directive so the process-wide
/// device log level is fixed once here.
pub fn build_filter(config: &LoggingConfig, override_level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = override_level.unwrap_or(&config.level);
    let directives = format!("{},{}={}", level, DEVICE_TARGET, config.device_level);
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the stderr subscriber. Diagnostics never go to stdout.
pub fn init_tracing(config: &LoggingConfig, override_level: Option<&str>) {
    let filter = build_filter(config, override_level);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}
