use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the trace exporter alive until the process is done with it.
pub struct TelemetryGuard {
    #[cfg(feature = "otlp")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otlp")]
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[{}] trace exporter shutdown failed: {}", env!("CARGO_PKG_NAME"), e);
            }
        }
    }
}

/// Install the process-wide subscriber. Call once, at the top of `main`.
///
/// Log lines carry the worker thread name so concurrent matches can be
/// told apart. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_names(true)
        .with_target(false);

    #[cfg(feature = "otlp")]
    {
        match otlp_provider(service_name) {
            Ok(provider) => {
                use opentelemetry::trace::TracerProvider;
                let tracer = provider.tracer(service_name.to_string());
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .with(otel_layer)
                    .try_init();
                return TelemetryGuard { provider: Some(provider) };
            }
            Err(e) => {
                eprintln!("[{}] OTLP export disabled: {}", service_name, e);
            }
        }
    }

    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
    tracing::debug!(service = service_name, "Tracing initialised");
    TelemetryGuard {
        #[cfg(feature = "otlp")]
        provider: None,
    }
}

#[cfg(feature = "otlp")]
fn otlp_provider(service_name: &str) -> Result<opentelemetry_sdk::trace::SdkTracerProvider, String> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{Protocol, WithExportConfig};
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .map_err(|_| "OTEL_EXPORTER_OTLP_ENDPOINT is not set".to_string())?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(format!("{}/v1/traces", endpoint.trim_end_matches('/')))
        .build()
        .map_err(|e| e.to_string())?;
    let resource = Resource::builder_empty()
        .with_attributes(vec![KeyValue::new("service.name", service_name.to_string())])
        .build();
    Ok(sdktrace::SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .with_resource(resource)
        .build())
}
