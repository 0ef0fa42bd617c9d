use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Group-wide tuning parameters, deserializable from TOML. Shared by the
/// pacer and every throttle it coordinates; live-editable through
/// [`ConfigUpdate`] except for `command_channel_capacity`, which is fixed
/// once the group's inbound channel exists.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Aggregate emission ceiling in bytes per second. `0` means unbounded.
    pub bytes_per_second: u64,
    /// Master switch. `false` means unbounded regardless of the rate.
    pub is_throttled: bool,
    /// Intra-second emission resolution. Must be at least 1.
    pub ticks_per_second: u32,
    /// Upper bound on any single throttle's pending buffer.
    pub max_buffer_size: usize,
    /// Interval between throughput samples.
    pub throughput_sample_interval_ms: u64,
    /// Sliding-window length of the throughput sampler.
    pub throughput_sample_size: usize,
    /// Inbound command channel bound.
    pub command_channel_capacity: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            bytes_per_second: 16_384,
            is_throttled: true,
            ticks_per_second: 10,
            max_buffer_size: 1_048_576, // 1 MiB
            throughput_sample_interval_ms: 1_000,
            throughput_sample_size: 8,
            command_channel_capacity: 10_000,
        }
    }
}

impl ThrottleConfig {
    /// Duration of one emission tick in milliseconds. Floored at 1 ms so a
    /// resolution above 1000 ticks/s cannot produce a zero-length tick.
    pub fn tick_duration_ms(&self) -> u64 {
        (1_000 / u64::from(self.ticks_per_second)).max(1)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_duration_ms())
    }

    /// True when throttling is effectively off: either the switch is off or
    /// the rate is 0 (unbounded).
    pub fn effectively_unthrottled(&self) -> bool {
        !self.is_throttled || self.bytes_per_second == 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::ZeroTicksPerSecond);
        }
        if (self.max_buffer_size as u64) < self.bytes_per_second {
            return Err(ConfigError::BufferBelowRate {
                max_buffer_size: self.max_buffer_size,
                bytes_per_second: self.bytes_per_second,
            });
        }
        Ok(())
    }

    /// Apply a partial update and validate the result. The merge is atomic:
    /// on error the current configuration is untouched.
    pub fn merged(&self, update: &ConfigUpdate) -> Result<ThrottleConfig, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = update.bytes_per_second {
            next.bytes_per_second = v;
        }
        if let Some(v) = update.is_throttled {
            next.is_throttled = v;
        }
        if let Some(v) = update.ticks_per_second {
            next.ticks_per_second = v;
        }
        if let Some(v) = update.max_buffer_size {
            next.max_buffer_size = v;
        }
        if let Some(v) = update.throughput_sample_interval_ms {
            next.throughput_sample_interval_ms = v;
        }
        if let Some(v) = update.throughput_sample_size {
            next.throughput_sample_size = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration merged into the live [`ThrottleConfig`] between
/// ticks. Absent fields keep their current values. Allocations already
/// computed for the in-progress tick may still use the prior values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub bytes_per_second: Option<u64>,
    pub is_throttled: Option<bool>,
    pub ticks_per_second: Option<u32>,
    pub max_buffer_size: Option<usize>,
    pub throughput_sample_interval_ms: Option<u64>,
    pub throughput_sample_size: Option<usize>,
}
