//! Logging and trace export.
//!
//! Controlled by `OTEL_EXPORTER_OTLP_ENDPOINT`:
//! - unset → human-readable log lines on stderr, filtered by `RUST_LOG`
//!   (or the level passed to [`init`])
//! - `"stderr"` → JSON spans/events on stderr
//! - `"http://..."` → OTLP HTTP export of traces and logs
//!
//! Operator-facing output does not go through here; see
//! [`Reporter`](crate::report::Reporter).

use tracing_subscriber::EnvFilter;

/// Dropping it flushes and shuts down the OTLP pipeline. Hold it in `main()`
/// until exit.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    trace_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "otel")]
    log_provider: Option<opentelemetry_sdk::logs::SdkLoggerProvider>,
}

impl TelemetryGuard {
    const fn local() -> Self {
        Self {
            #[cfg(feature = "otel")]
            trace_provider: None,
            #[cfg(feature = "otel")]
            log_provider: None,
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(provider) = self.trace_provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("otel trace shutdown error: {e}");
            }
            if let Some(provider) = self.log_provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("otel log shutdown error: {e}");
            }
        }
    }
}

/// Initialize logging. `default_level` applies when `RUST_LOG` is unset.
#[must_use]
pub fn init(default_level: &str) -> TelemetryGuard {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match endpoint.as_deref() {
        None | Some("") => init_console(filter),
        Some("stderr") => init_json(filter),
        #[cfg(feature = "otel")]
        Some(_) => init_otlp(filter),
        #[cfg(not(feature = "otel"))]
        Some(_) => {
            eprintln!(
                "warning: OTEL_EXPORTER_OTLP_ENDPOINT set but arcland built without 'otel' feature"
            );
            init_console(filter)
        }
    }
}

fn init_console(filter: EnvFilter) -> TelemetryGuard {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    TelemetryGuard::local()
}

fn init_json(filter: EnvFilter) -> TelemetryGuard {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
    TelemetryGuard::local()
}

/// The SDK reads `OTEL_EXPORTER_OTLP_ENDPOINT` itself and appends
/// `/v1/traces` or `/v1/logs`.
#[cfg(feature = "otel")]
fn init_otlp(filter: EnvFilter) -> TelemetryGuard {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let span_exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP span exporter: {e}");
            return init_console(filter);
        }
    };
    let log_exporter = match opentelemetry_otlp::LogExporter::builder()
        .with_http()
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP log exporter: {e}");
            return init_console(filter);
        }
    };

    let resource = otel_resource();
    let trace_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_simple_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();
    let tracer = trace_provider.tracer(env!("CARGO_PKG_NAME"));
    let log_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_simple_exporter(log_exporter)
        .with_resource(resource)
        .build();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
            &log_provider,
        ))
        .try_init();

    TelemetryGuard {
        trace_provider: Some(trace_provider),
        log_provider: Some(log_provider),
    }
}

#[cfg(feature = "otel")]
fn otel_resource() -> opentelemetry_sdk::Resource {
    use opentelemetry::KeyValue;
    opentelemetry_sdk::Resource::builder()
        .with_attribute(KeyValue::new("service.name", env!("CARGO_PKG_NAME")))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}
