use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::config::ConfigUpdate;
use crate::error::{ConfigError, ThrottleError};
use crate::group::sampler::ThroughputMetrics;
use crate::group::stats::GroupStats;

/// Identifier of a throttle within its group. Allocated by the pacer from a
/// monotonic counter; never reused.
pub type ThrottleId = u64;

/// Observer invoked with each emitted slice.
pub type BytesWrittenFn = Box<dyn FnMut(&Bytes) + Send>;

/// Observer invoked with each throughput sample.
pub type ThroughputFn = Box<dyn FnMut(ThroughputMetrics) + Send>;

/// Options for creating a throttle.
#[derive(Default)]
pub struct ThrottleOptions {
    /// Expected stream length, used to size the initial pending buffer.
    pub content_length: Option<usize>,
    /// When true, write receipts mature only once the written chunk has
    /// been emitted downstream, giving end-to-end backpressure. When false,
    /// receipts mature as soon as the bytes are buffered.
    pub backpressure: bool,
    /// Emission observer.
    pub on_bytes_written: Option<BytesWrittenFn>,
}

/// The endpoints the pacer hands back for a freshly created throttle.
/// Consumed by `ThrottleGroup::create_throttle` to assemble the public
/// writer/reader handles.
pub struct ThrottleEndpoints {
    pub id: ThrottleId,
    pub downstream: mpsc::UnboundedReceiver<Bytes>,
    pub done: oneshot::Receiver<Result<(), ThrottleError>>,
}

/// Commands sent from IO threads to the single-threaded pacer.
///
/// Variants that expect a response carry a `tokio::sync::oneshot::Sender`;
/// fire-and-forget commands omit it.
pub enum PacerCommand {
    CreateThrottle {
        options: ThrottleOptions,
        reply: oneshot::Sender<ThrottleEndpoints>,
    },
    Write {
        id: ThrottleId,
        chunk: Bytes,
        receipt: oneshot::Sender<Result<(), ThrottleError>>,
    },
    EndInput {
        id: ThrottleId,
    },
    Abort {
        id: ThrottleId,
    },
    GracefulAbort {
        id: ThrottleId,
    },
    Configure {
        update: ConfigUpdate,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    SetThroughputObserver {
        observer: ThroughputFn,
    },
    GetStats {
        reply: oneshot::Sender<GroupStats>,
    },
    Shutdown,
}
