use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::TracerProvider
};
use std::sync::OnceLock;

use crate::env::env;


static PROVIDER: OnceLock<TracerProvider> = OnceLock::new();

pub fn init_otel(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", format!("brunan-{name}")),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("deployment.environment.name",
            if env().dev { "dev" } else { "prod" })
    ]);

    let provider = TracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(
            opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                .build()?,
            opentelemetry_sdk::runtime::Tokio)
        .build();

    global::set_tracer_provider(provider.clone());

    let _ = PROVIDER.set(provider);

    Ok(())
}

pub fn shutdown_otel() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(provider) = PROVIDER.get() {
        provider.shutdown()?;
    }

    Ok(())
}
