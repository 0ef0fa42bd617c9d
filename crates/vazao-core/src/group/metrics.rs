use opentelemetry::metrics::{Counter, Gauge, Meter};

use crate::group::sampler::ThroughputMetrics;

/// Core OTel metrics for the group. Created once during pacer init and
/// recorded on each tick and lifecycle event. All instruments are no-op
/// unless a global meter provider is configured.
pub struct Metrics {
    pub bytes_emitted: Counter<u64>,
    pub throttles_created: Counter<u64>,
    pub throttles_completed: Counter<u64>,
    pub throttles_aborted: Counter<u64>,
    pub ticks: Counter<u64>,
    pub in_flight: Gauge<u64>,
    pub throughput_average: Gauge<f64>,
    pub throughput_utilization: Gauge<f64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("vazao");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter (used in tests with an
    /// in-memory exporter).
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            bytes_emitted: meter
                .u64_counter("vazao.bytes.emitted")
                .with_description("Total bytes emitted downstream")
                .build(),
            throttles_created: meter
                .u64_counter("vazao.throttles.created")
                .with_description("Total throttles created")
                .build(),
            throttles_completed: meter
                .u64_counter("vazao.throttles.completed")
                .with_description("Throttles that drained and completed")
                .build(),
            throttles_aborted: meter
                .u64_counter("vazao.throttles.aborted")
                .with_description("Throttles torn down before completion")
                .build(),
            ticks: meter
                .u64_counter("vazao.ticks")
                .with_description("Emission ticks executed")
                .build(),
            in_flight: meter
                .u64_gauge("vazao.throttles.in_flight")
                .with_description("Throttles currently eligible for quota")
                .build(),
            throughput_average: meter
                .f64_gauge("vazao.throughput.average")
                .with_description("Sampled average emission rate in bytes per second")
                .build(),
            throughput_utilization: meter
                .f64_gauge("vazao.throughput.utilization")
                .with_description("Sampled emission rate over the configured ceiling")
                .build(),
        }
    }

    pub fn record_emitted(&self, bytes: usize) {
        if bytes > 0 {
            self.bytes_emitted.add(bytes as u64, &[]);
        }
    }

    pub fn record_created(&self) {
        self.throttles_created.add(1, &[]);
    }

    pub fn record_completed(&self) {
        self.throttles_completed.add(1, &[]);
    }

    pub fn record_aborted(&self) {
        self.throttles_aborted.add(1, &[]);
    }

    pub fn record_tick(&self) {
        self.ticks.add(1, &[]);
    }

    pub fn set_in_flight(&self, count: usize) {
        self.in_flight.record(count as u64, &[]);
    }

    pub fn set_throughput(&self, sample: ThroughputMetrics) {
        self.throughput_average
            .record(sample.average_bytes_per_second, &[]);
        self.throughput_utilization.record(sample.utilization, &[]);
    }
}
