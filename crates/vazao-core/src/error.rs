/// Configuration validation errors. Construction and live updates share the
/// same checks; a rejected update leaves the previous configuration in place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("ticks_per_second must be at least 1")]
    ZeroTicksPerSecond,

    #[error("max_buffer_size ({max_buffer_size}) must not be smaller than bytes_per_second ({bytes_per_second})")]
    BufferBelowRate {
        max_buffer_size: usize,
        bytes_per_second: u64,
    },
}

/// Per-stream failures, delivered through write receipts and the done signal.
/// Errors on one throttle never propagate to its siblings — their quota is
/// simply reapportioned on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleError {
    #[error("pending buffer overflow: {attempted} bytes exceeds max_buffer_size {max}")]
    BufferOverflow { attempted: usize, max: usize },

    #[error("throttle aborted")]
    Aborted,

    #[error("throttle already destroyed")]
    ThrottleGone,
}

/// Errors surfaced by the `ThrottleGroup` handle itself.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("command channel full")]
    ChannelFull,

    #[error("command channel disconnected")]
    ChannelDisconnected,

    #[error("failed to spawn pacer thread: {0}")]
    PacerSpawn(String),

    #[error("pacer thread panicked")]
    PacerPanicked,

    #[error("end-of-input already signalled")]
    AlreadyEnded,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

pub type GroupResult<T> = std::result::Result<T, GroupError>;
