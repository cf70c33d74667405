use std::{env, error::Error};

use opentelemetry::{global, trace::TraceError, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::Tracer, Resource};
use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{self, LogConfig};

/// Sets up logging from the configuration file named by `LOG_CONFIG`
/// (default `./properties/log4js.json`).
///
/// A missing or malformed configuration does not fail the setup: logging
/// falls back to the console with every category enabled, and a warning is
/// logged.
///
/// Spans are exported via otlp when `OTEL_EXPORTER_OTLP_ENDPOINT` is set. The
/// service name can be configured using the env var `SERVICE_NAME`, otherwise
/// the cargo name will be used.
///
/// This should generally be the first statement of any server binary's main
/// function. Loggers handed out earlier switch to the file's thresholds.
pub fn setup() -> Result<(), Box<dyn Error>> {
    match LogConfig::from_env() {
        Ok(config) => setup_with_config(config),
        Err(error) => {
            setup_with_config(LogConfig::default())?;
            tracing::warn!(%error, "falling back to console logging at level ALL");
            Ok(())
        }
    }
}

/// Same as [`setup`] with an explicit configuration.
pub fn setup_with_config(config: LogConfig) -> Result<(), Box<dyn Error>> {
    let telemetry = match env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => {
            let service =
                env::var("SERVICE_NAME").unwrap_or(env!("CARGO_PKG_NAME").to_string());
            let tracer = init_tracer(service.leak(), endpoint.leak())?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        Err(_) => None,
    };

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy()
        }))
        .with(telemetry)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let categories = config.categories.len();
    config::install(config);
    tracing::info!(categories, "logging initialised");
    Ok(())
}

fn init_tracer(service: &'static str, endpoint: &'static str) -> Result<Tracer, TraceError> {
    global::set_text_map_propagator(opentelemetry_jaeger_propagator::Propagator::new());
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config().with_resource(Resource::new(vec![KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                service,
            )])),
        )
        .install_batch(runtime::Tokio)
}

pub fn teardown() {
    global::shutdown_tracer_provider();
}
