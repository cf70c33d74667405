use std::io::Write;

use logtrack::{
    config::{Level, CONFIG_ENV},
    get_logger,
    setup::setup,
};

const CONF: &str = r#"{
    "appenders": {
        "out": { "type": "console" },
        "node_queue": { "type": "dateFile", "filename": "./logs/queue.log", "pattern": "-yyyyMMdd" }
    },
    "categories": {
        "default": { "appenders": ["out"], "level": "DEBUG" },
        "node_queue": { "appenders": ["out", "node_queue"], "level": "WARN" }
    }
}"#;

#[test]
fn categories_set_logger_thresholds() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONF.as_bytes()).unwrap();
    std::env::set_var(CONFIG_ENV, file.path());
    std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");

    setup().unwrap();

    let queue = get_logger("node_queue");
    assert_eq!(queue.threshold(), Level::Warn);
    assert!(queue.is_warn_enabled());
    assert!(!queue.is_info_enabled());

    assert_eq!(get_logger("node_server").threshold(), Level::Debug);
}
