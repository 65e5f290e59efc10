//! Provides helper functions for initializing telemetry collection and publication.
use std::time::Duration;

use anyhow::Result;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::MeterProvider, runtime, Resource};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter, Registry};

const SERVICE_NAME: &str = "olly-ats";

/// Handle to the telemetry pipelines installed by [`init`].
///
/// Call [`Telemetry::shutdown`] before exiting so buffered spans and metrics are flushed.
pub struct Telemetry {
    meter_provider: Option<MeterProvider>,
}

impl Telemetry {
    /// Flush and stop any exporters.
    pub fn shutdown(self) -> Result<()> {
        if let Some(meter_provider) = self.meter_provider {
            global::shutdown_tracer_provider();
            meter_provider.shutdown()?;
        }
        Ok(())
    }
}

fn resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(
            "hostname",
            gethostname::gethostname()
                .into_string()
                .unwrap_or_else(|_| "unknown".to_owned()),
        ),
        KeyValue::new("service.name", SERVICE_NAME),
    ])
}

/// Initialize logging, and tracing plus metrics when an OTLP endpoint is given.
///
/// Without an endpoint only the compact log layer is installed and the global meter
/// stays a no-op, which is what CI runs without a collector want.
pub async fn init(otlp_endpoint: Option<String>) -> Result<Telemetry> {
    // Default to INFO if no env is specified
    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let logger = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .compact()
        .with_filter(log_filter);

    let Some(otlp_endpoint) = otlp_endpoint else {
        tracing::subscriber::set_global_default(Registry::default().with(logger))?;
        return Ok(Telemetry {
            meter_provider: None,
        });
    };

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(otlp_endpoint.clone()),
        )
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(resource()))
        .install_batch(runtime::Tokio)?;

    // Build starts the meter and sets it as the global meter provider
    let meter_provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(otlp_endpoint),
        )
        .with_resource(resource())
        .with_period(Duration::from_secs(10))
        .build()?;

    let otlp_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let telemetry = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(otlp_filter);

    let collector = Registry::default().with(logger).with(telemetry);
    tracing::subscriber::set_global_default(collector)?;

    Ok(Telemetry {
        meter_provider: Some(meter_provider),
    })
}
