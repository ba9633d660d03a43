use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const POLICY: &str = "policy";
    pub const DECISION: &str = "decision";
    pub const ERROR_TYPE: &str = "error_type";
    pub const STATUS_CODE: &str = "status_code";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const DECISION_ALLOWED: &str = "allowed";
    pub const DECISION_QUEUED: &str = "queued";
    pub const DECISION_REJECTED: &str = "rejected";
}

#[derive(Clone)]
pub struct Metrics {
    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,

    // Admission decisions
    pub admission_requests_total: Counter<u64>,
    pub admission_allowed_total: Counter<u64>,
    pub admission_queued_total: Counter<u64>,
    pub admission_rejected_total: Counter<u64>,
    pub admission_errors_total: Counter<u64>,

    // Queue and state lifecycle
    pub admission_queue_wait_seconds: Histogram<f64>,
    pub admission_partitions_evicted_total: Counter<u64>,

    // Build info
    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("gate_requests_total")
                .with_description("Total number of requests answered by the gate")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("gate_requests_duration_seconds")
                .with_description("Time to answer an admission request, including queueing")
                .build(),

            admission_requests_total: meter
                .u64_counter("admission_requests_total")
                .with_description("Total number of admission checks")
                .build(),
            admission_allowed_total: meter
                .u64_counter("admission_allowed_total")
                .with_description("Admission checks that were allowed immediately")
                .build(),
            admission_queued_total: meter
                .u64_counter("admission_queued_total")
                .with_description("Admission checks that were queued for a later window")
                .build(),
            admission_rejected_total: meter
                .u64_counter("admission_rejected_total")
                .with_description("Admission checks rejected for exceeding the quota")
                .build(),
            admission_errors_total: meter
                .u64_counter("admission_errors_total")
                .with_description("Admission checks refused because of an unknown policy or role")
                .build(),

            admission_queue_wait_seconds: meter
                .f64_histogram("admission_queue_wait_seconds")
                .with_description("Time queued callers waited before being resolved")
                .build(),
            admission_partitions_evicted_total: meter
                .u64_counter("admission_partitions_evicted_total")
                .with_description("Idle quota states evicted by the sweeper")
                .build(),

            build_info: meter
                .u64_gauge("gate_build_info")
                .with_description("Build information")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_admission_decision(&self, policy: &str, decision: &str) {
        let attrs = [KeyValue::new(labels::POLICY, policy.to_string())];
        self.admission_requests_total.add(1, &attrs);
        match decision {
            values::DECISION_ALLOWED => self.admission_allowed_total.add(1, &attrs),
            values::DECISION_QUEUED => self.admission_queued_total.add(1, &attrs),
            values::DECISION_REJECTED => self.admission_rejected_total.add(1, &attrs),
            _ => {}
        }
    }

    pub fn record_admission_error(&self, policy: &str, error_type: &str) {
        self.admission_errors_total.add(
            1,
            &[
                KeyValue::new(labels::POLICY, policy.to_string()),
                KeyValue::new(labels::ERROR_TYPE, error_type.to_string()),
            ],
        );
    }

    pub fn record_queue_wait(&self, policy: &str, decision: &str, seconds: f64) {
        self.admission_queue_wait_seconds.record(
            seconds,
            &[
                KeyValue::new(labels::POLICY, policy.to_string()),
                KeyValue::new(labels::DECISION, decision.to_string()),
            ],
        );
    }

    pub fn record_partitions_evicted(&self, count: u64) {
        self.admission_partitions_evicted_total.add(count, &[]);
    }

    pub fn record_request(&self, status_code: u16, seconds: f64) {
        let attrs = [KeyValue::new(labels::STATUS_CODE, i64::from(status_code))];
        self.requests_total.add(1, &attrs);
        self.requests_duration_seconds.record(seconds, &attrs);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("admission-gate");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}

