use so_core::config::{GeneralConfig, LogFormat};
use tracing_subscriber::{fmt, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging with human-readable output.
///
/// Uses `RUST_LOG` if set, otherwise `default_level` (e.g. "info",
/// "so_bridge=debug,warn"). Output goes to stderr so it never mixes with
/// command output. Later calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    fmt()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (human-readable)");
}

/// Initialize logging with one JSON object per line.
///
/// Later calls are no-ops.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    fmt()
        .json()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (json)");
}

/// Initialize logging from the `[general]` config section.
pub fn init_from_config(general: &GeneralConfig) {
    match general.log_format {
        LogFormat::Human => init_logging(&general.app_name, &general.log_level),
        LogFormat::Json => init_logging_json(&general.app_name, &general.log_level),
    }
}
