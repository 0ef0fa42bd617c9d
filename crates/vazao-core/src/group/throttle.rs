use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};

use crate::error::ThrottleError;
use crate::group::command::{BytesWrittenFn, ThrottleId};
use crate::group::stats::ThrottleStats;

/// Floor for the initial buffer allocation so a zero-byte hint or rate
/// still reserves something useful.
const MIN_CAPACITY: usize = 512;

/// Per-stream state, owned exclusively by the pacer.
///
/// The pending buffer holds producer bytes that have not yet been emitted.
/// `split_to(n).freeze()` hands the emitted slice downstream in O(1) and
/// lets `BytesMut` reclaim the region on the next reserve, so there is no
/// separate compaction step.
pub(crate) struct Throttle {
    pub(crate) id: ThrottleId,
    pending: BytesMut,
    capacity: usize,
    producing: bool,
    backpressure: bool,
    downstream: mpsc::UnboundedSender<Bytes>,
    done: Option<oneshot::Sender<Result<(), ThrottleError>>>,
    on_bytes_written: Option<BytesWrittenFn>,
    total_written: u64,
    total_emitted: u64,
    /// Backpressure receipts keyed by the written-bytes watermark at which
    /// they mature.
    waiters: VecDeque<(u64, oneshot::Sender<Result<(), ThrottleError>>)>,
}

impl Throttle {
    pub(crate) fn new(
        id: ThrottleId,
        backpressure: bool,
        on_bytes_written: Option<BytesWrittenFn>,
        downstream: mpsc::UnboundedSender<Bytes>,
        done: oneshot::Sender<Result<(), ThrottleError>>,
        initial_capacity: usize,
    ) -> Self {
        let capacity = initial_capacity.max(MIN_CAPACITY);
        Self {
            id,
            pending: BytesMut::with_capacity(capacity),
            capacity,
            producing: false,
            backpressure,
            downstream,
            done: Some(done),
            on_bytes_written,
            total_written: 0,
            total_emitted: 0,
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn set_producing(&mut self, producing: bool) {
        self.producing = producing;
    }

    pub(crate) fn backpressure(&self) -> bool {
        self.backpressure
    }

    /// True when the reader end has been dropped — nothing downstream will
    /// ever consume another byte.
    pub(crate) fn downstream_detached(&self) -> bool {
        self.downstream.is_closed()
    }

    /// Drained and the producer has finished: ready to finalize.
    pub(crate) fn is_complete(&self) -> bool {
        self.pending.is_empty() && !self.producing
    }

    /// Ensure room for `incoming` more bytes, growing the logical capacity
    /// in `rate`-sized rounds up to `max`. An append that cannot fit even
    /// at `max` is an overflow; nothing is appended.
    pub(crate) fn try_reserve(
        &mut self,
        incoming: usize,
        rate: u64,
        max: usize,
    ) -> Result<(), ThrottleError> {
        let needed = self.pending.len() + incoming;
        if needed > max {
            return Err(ThrottleError::BufferOverflow {
                attempted: needed,
                max,
            });
        }
        if needed > self.capacity {
            let round = if rate == 0 { max } else { rate as usize };
            self.capacity = needed.div_ceil(round).saturating_mul(round).min(max);
        }
        // reserve() reuses the already-emitted front region when possible,
        // which is the compact-then-grow policy in one call
        self.pending.reserve(self.capacity - self.pending.len());
        Ok(())
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        self.total_written += chunk.len() as u64;
    }

    /// Register a backpressure receipt maturing once every byte written so
    /// far has been emitted.
    pub(crate) fn push_waiter(&mut self, receipt: oneshot::Sender<Result<(), ThrottleError>>) {
        self.waiters.push_back((self.total_written, receipt));
    }

    /// Emit up to `max_bytes` from the front of the pending buffer.
    /// Returns the number of bytes emitted.
    pub(crate) fn process(&mut self, max_bytes: usize) -> usize {
        let n = max_bytes.min(self.pending.len());
        if n > 0 {
            let slice = self.pending.split_to(n).freeze();
            // A closed receiver is detachment; the tick loop handles it
            let _ = self.downstream.send(slice.clone());
            self.total_emitted += n as u64;
            if let Some(cb) = self.on_bytes_written.as_mut() {
                cb(&slice);
            }
            self.release_matured_waiters();
        }
        n
    }

    fn release_matured_waiters(&mut self) {
        while self
            .waiters
            .front()
            .is_some_and(|(watermark, _)| *watermark <= self.total_emitted)
        {
            if let Some((_, receipt)) = self.waiters.pop_front() {
                let _ = receipt.send(Ok(()));
            }
        }
    }

    /// Resolve the done signal. Later calls are no-ops, which is what makes
    /// destroy idempotent.
    pub(crate) fn resolve_done(&mut self, result: Result<(), ThrottleError>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }

    /// Resolve every outstanding receipt successfully (graceful teardown).
    pub(crate) fn release_all_waiters(&mut self) {
        while let Some((_, receipt)) = self.waiters.pop_front() {
            let _ = receipt.send(Ok(()));
        }
    }

    /// Fail every outstanding receipt (overflow or hard abort).
    pub(crate) fn fail_waiters(&mut self, err: &ThrottleError) {
        while let Some((_, receipt)) = self.waiters.pop_front() {
            let _ = receipt.send(Err(err.clone()));
        }
    }

    pub(crate) fn stats(&self, in_flight: bool) -> ThrottleStats {
        ThrottleStats {
            id: self.id,
            pending_bytes: self.pending.len(),
            buffer_capacity: self.capacity,
            producing: self.producing,
            in_flight,
            total_written: self.total_written,
            total_emitted: self.total_emitted,
        }
    }
}
