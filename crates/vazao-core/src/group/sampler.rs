use std::collections::VecDeque;

/// One throughput observation delivered to the group's observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputMetrics {
    /// Mean emission rate over the sliding window.
    pub average_bytes_per_second: f64,
    /// `average_bytes_per_second / bytes_per_second`, clamped to 1.0.
    /// Reported as 0.0 when the group is unbounded.
    pub utilization: f64,
}

/// Sliding-window throughput sampler. Each sample is the number of bytes
/// the pacer processed since the previous sample; the window holds the most
/// recent `max_samples` of them.
///
/// Owned by the single-threaded pacer and fed explicitly — the run loop
/// decides when an interval has elapsed, so tests drive virtual time.
pub(crate) struct ThroughputSampler {
    window: VecDeque<u64>,
    prev_total: u64,
    max_samples: usize,
    interval_ms: u64,
}

impl ThroughputSampler {
    pub(crate) fn new(interval_ms: u64, max_samples: usize) -> Self {
        Self {
            window: VecDeque::new(),
            prev_total: 0,
            max_samples: max_samples.max(1),
            interval_ms: interval_ms.max(1),
        }
    }

    /// Record one sampling interval given the pacer's running byte counter.
    ///
    /// Returns the computed metrics and whether the caller should reset the
    /// counter: an idle interval (zero delta) is the safe moment to zero it
    /// so the running total cannot grow without bound.
    pub(crate) fn sample(
        &mut self,
        total_bytes_processed: u64,
        bytes_per_second: u64,
    ) -> (ThroughputMetrics, bool) {
        let delta = total_bytes_processed.saturating_sub(self.prev_total);
        self.window.push_back(delta);
        while self.window.len() > self.max_samples {
            self.window.pop_front();
        }

        let reset = delta == 0;
        self.prev_total = if reset { 0 } else { total_bytes_processed };

        let mean = self.window.iter().sum::<u64>() as f64 / self.window.len() as f64;
        let average_bytes_per_second = mean * (1_000.0 / self.interval_ms as f64);
        let utilization = if bytes_per_second == 0 {
            0.0
        } else {
            (average_bytes_per_second / bytes_per_second as f64).min(1.0)
        };

        (
            ThroughputMetrics {
                average_bytes_per_second,
                utilization,
            },
            reset,
        )
    }

    /// Apply new tuning. The window keeps its current samples; a shrunken
    /// size takes effect on the next push.
    pub(crate) fn reconfigure(&mut self, interval_ms: u64, max_samples: usize) {
        self.interval_ms = interval_ms.max(1);
        self.max_samples = max_samples.max(1);
    }

    pub(crate) fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}
