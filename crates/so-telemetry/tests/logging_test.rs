use so_core::config::{GeneralConfig, LogFormat};
use so_telemetry::logging;

#[test]
fn init_logging_twice_is_a_noop() {
    logging::init_logging("test-service", "debug");
    logging::init_logging("test-service", "info");

    tracing::info!(key = "value", "human-readable log line");
}

#[test]
fn init_logging_json_after_global_set() {
    // whichever test runs first owns the global subscriber
    logging::init_logging_json("test-service-json", "info");

    tracing::info!(key = "value", "json log line");
}

#[test]
fn init_from_config_accepts_both_formats() {
    let mut general = GeneralConfig::default();
    logging::init_from_config(&general);
    general.log_format = LogFormat::Json;
    general.log_level = "so_bridge=debug,warn".into();
    logging::init_from_config(&general);
}
