use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;

#[derive(Clone)]
pub struct Metrics {
    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,

    pub rule_matches_total: Counter<u64>,
    pub denials_total: Counter<u64>,

    pub counter_store_errors_total: Counter<u64>,
    pub origin_errors_total: Counter<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("gatewarden_requests_total")
                .with_description("Total number of requests processed")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("gatewarden_requests_duration_seconds")
                .with_description("Request duration in seconds")
                .build(),

            rule_matches_total: meter
                .u64_counter("gatewarden_rule_matches_total")
                .with_description("Total number of requests matched by a rule")
                .build(),
            denials_total: meter
                .u64_counter("gatewarden_denials_total")
                .with_description("Total number of over-limit counter verdicts")
                .build(),

            counter_store_errors_total: meter
                .u64_counter("gatewarden_counter_store_errors_total")
                .with_description("Counter store failures (request passed through)")
                .build(),
            origin_errors_total: meter
                .u64_counter("gatewarden_origin_errors_total")
                .with_description("Failed origin fetches")
                .build(),
        }
    }
}

pub fn init_metrics() -> Result<(Metrics, Registry), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_reader(exporter)
        .build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("gatewarden");
    let metrics = Metrics::new(meter);

    Ok((metrics, registry))
}
