use logtrack::{
    config::{self, Level, CONFIG_ENV},
    get_logger,
    setup::setup,
};

#[test]
fn missing_configuration_falls_back_to_console() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(CONFIG_ENV, dir.path().join("absent.json"));
    std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");

    setup().unwrap();

    assert_eq!(config::active().threshold("node_server"), Level::All);
    let logger = get_logger("node_server");
    assert_eq!(logger.threshold(), Level::All);
    assert!(logger.is_error_enabled());

    // the subscriber can only be installed once per process
    assert!(setup().is_err());
}
