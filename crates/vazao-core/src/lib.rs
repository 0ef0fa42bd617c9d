pub mod config;
pub mod error;
pub mod group;
pub mod partition;
pub mod telemetry;

pub use config::{ConfigUpdate, ThrottleConfig};
pub use error::{ConfigError, GroupError, GroupResult, ThrottleError};
pub use group::command::{ThrottleId, ThrottleOptions};
pub use group::handle::{DoneHandle, ThrottleReader, ThrottleWriter, WriteReceipt};
pub use group::sampler::ThroughputMetrics;
pub use group::stats::{GroupStats, ThrottleStats};
pub use group::ThrottleGroup;
pub use partition::fair_share;
