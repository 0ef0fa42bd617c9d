use crate::group::command::ThrottleId;

/// Point-in-time snapshot of a single throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleStats {
    pub id: ThrottleId,
    /// Unemitted bytes currently buffered.
    pub pending_bytes: usize,
    /// Logical buffer capacity (grows in rate-sized rounds).
    pub buffer_capacity: usize,
    /// Producer has written and not yet signalled end-of-input.
    pub producing: bool,
    /// Member of the group's in-flight set.
    pub in_flight: bool,
    pub total_written: u64,
    pub total_emitted: u64,
}

/// Aggregate snapshot of the group, taken atomically on the pacer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    pub in_flight: usize,
    pub clock_running: bool,
    pub total_bytes_processed: u64,
    pub bytes_per_second: u64,
    pub is_throttled: bool,
    pub throttles: Vec<ThrottleStats>,
}
