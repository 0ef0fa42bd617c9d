use super::*;

use tokio::sync::{mpsc, oneshot};

pub(super) fn test_config() -> ThrottleConfig {
    ThrottleConfig {
        bytes_per_second: 100,
        is_throttled: true,
        ticks_per_second: 10,
        max_buffer_size: 10_000,
        throughput_sample_interval_ms: 1_000,
        throughput_sample_size: 8,
        command_channel_capacity: 256,
    }
}

pub(super) fn test_setup() -> (crossbeam_channel::Sender<PacerCommand>, Pacer) {
    test_setup_with(test_config())
}

pub(super) fn test_setup_with(
    config: ThrottleConfig,
) -> (crossbeam_channel::Sender<PacerCommand>, Pacer) {
    let (tx, rx) = crossbeam_channel::bounded(config.command_channel_capacity);
    (tx, Pacer::new(rx, config))
}

/// The endpoints a test holds for one throttle.
pub(super) struct TestThrottle {
    pub(super) id: ThrottleId,
    pub(super) chunks: mpsc::UnboundedReceiver<Bytes>,
    pub(super) done: oneshot::Receiver<Result<(), ThrottleError>>,
}

pub(super) fn create_throttle(
    tx: &crossbeam_channel::Sender<PacerCommand>,
    pacer: &mut Pacer,
    options: ThrottleOptions,
) -> TestThrottle {
    let (reply_tx, mut reply_rx) = oneshot::channel();
    tx.send(PacerCommand::CreateThrottle {
        options,
        reply: reply_tx,
    })
    .unwrap();
    pacer.handle_all_pending();
    let endpoints = reply_rx.try_recv().unwrap();
    TestThrottle {
        id: endpoints.id,
        chunks: endpoints.downstream,
        done: endpoints.done,
    }
}

/// Helper: send a write and process it, returning the receipt.
pub(super) fn send_write(
    tx: &crossbeam_channel::Sender<PacerCommand>,
    pacer: &mut Pacer,
    id: ThrottleId,
    bytes: &[u8],
) -> oneshot::Receiver<Result<(), ThrottleError>> {
    let (receipt_tx, receipt_rx) = oneshot::channel();
    tx.send(PacerCommand::Write {
        id,
        chunk: Bytes::copy_from_slice(bytes),
        receipt: receipt_tx,
    })
    .unwrap();
    pacer.handle_all_pending();
    receipt_rx
}

pub(super) fn send_end(
    tx: &crossbeam_channel::Sender<PacerCommand>,
    pacer: &mut Pacer,
    id: ThrottleId,
) {
    tx.send(PacerCommand::EndInput { id }).unwrap();
    pacer.handle_all_pending();
}

/// Helper: send a configuration update and process it, returning the
/// pacer's verdict.
pub(super) fn send_configure(
    tx: &crossbeam_channel::Sender<PacerCommand>,
    pacer: &mut Pacer,
    update: ConfigUpdate,
) -> Result<(), ConfigError> {
    let (reply_tx, mut reply_rx) = oneshot::channel();
    tx.send(PacerCommand::Configure {
        update,
        reply: reply_tx,
    })
    .unwrap();
    pacer.handle_all_pending();
    reply_rx.try_recv().unwrap()
}

/// Drain every chunk currently buffered in a reader, returning the sizes.
pub(super) fn drain(chunks: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<usize> {
    let mut sizes = Vec::new();
    while let Ok(chunk) = chunks.try_recv() {
        sizes.push(chunk.len());
    }
    sizes
}

/// Advance the pacer through `n` ticks of virtual time starting at `start`,
/// returning the instant one tick past the last firing.
pub(super) fn run_ticks(pacer: &mut Pacer, start: Instant, n: u32) -> Instant {
    let step = pacer.config.tick_duration();
    let mut now = start;
    for _ in 0..n {
        pacer.tick(now);
        now += step;
    }
    now
}
