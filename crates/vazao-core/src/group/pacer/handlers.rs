use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ConfigUpdate;
use crate::error::{ConfigError, ThrottleError};
use crate::group::command::{ThrottleEndpoints, ThrottleId, ThrottleOptions};
use crate::group::stats::GroupStats;
use crate::group::throttle::Throttle;

use super::{Pacer, TickClock};

impl Pacer {
    pub(super) fn create_throttle(&mut self, options: ThrottleOptions) -> ThrottleEndpoints {
        let id = self.next_id;
        self.next_id += 1;

        let (down_tx, down_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let initial = self.initial_capacity(options.content_length);
        let throttle = Throttle::new(
            id,
            options.backpressure,
            options.on_bytes_written,
            down_tx,
            done_tx,
            initial,
        );
        self.throttles.insert(id, throttle);
        self.metrics.record_created();
        debug!(%id, backpressure = options.backpressure, "throttle created");

        ThrottleEndpoints {
            id,
            downstream: down_rx,
            done: done_rx,
        }
    }

    /// A content-length hint sizes the buffer for the whole stream; absent
    /// one, a second's worth of budget is the natural unit.
    fn initial_capacity(&self, content_length: Option<usize>) -> usize {
        let hint = content_length.unwrap_or(self.config.bytes_per_second as usize);
        hint.min(self.config.max_buffer_size)
    }

    pub(super) fn handle_write(
        &mut self,
        id: ThrottleId,
        chunk: Bytes,
        receipt: oneshot::Sender<Result<(), ThrottleError>>,
    ) {
        let rate = self.config.bytes_per_second;
        let max = self.config.max_buffer_size;
        let unthrottled = self.config.effectively_unthrottled();

        let Some(throttle) = self.throttles.get_mut(&id) else {
            // Use-after-destroy is a no-op beyond failing the receipt
            let _ = receipt.send(Err(ThrottleError::ThrottleGone));
            return;
        };

        if let Err(e) = throttle.try_reserve(chunk.len(), rate, max) {
            warn!(%id, error = %e, "pending buffer overflow, destroying throttle");
            let _ = receipt.send(Err(e.clone()));
            self.metrics.record_aborted();
            self.destroy(id, Err(e));
            return;
        }

        throttle.append(&chunk);
        throttle.set_producing(true);
        if throttle.backpressure() {
            throttle.push_waiter(receipt);
        } else {
            let _ = receipt.send(Ok(()));
        }

        if unthrottled {
            // Pass-through: drain now, no clock, no in-flight membership
            let emitted = throttle.process(usize::MAX);
            self.total_bytes_processed += emitted as u64;
            self.metrics.record_emitted(emitted);
            return;
        }

        if !self.in_flight.contains(&id) {
            self.on_start(id);
        }
    }

    pub(super) fn handle_end_input(&mut self, id: ThrottleId) {
        let unthrottled = self.config.effectively_unthrottled();
        let Some(throttle) = self.throttles.get_mut(&id) else {
            return;
        };
        throttle.set_producing(false);

        if unthrottled {
            let emitted = throttle.process(usize::MAX);
            self.total_bytes_processed += emitted as u64;
            self.metrics.record_emitted(emitted);
            self.finish(id);
        } else if throttle.pending_len() == 0 {
            self.finish(id);
        }
        // otherwise the clocked emit path finalizes after the last byte
    }

    /// Graceful completion: done resolves `Ok`, outstanding receipts are
    /// released, then the throttle is destroyed.
    pub(super) fn finish(&mut self, id: ThrottleId) {
        self.metrics.record_completed();
        debug!(%id, "throttle completed");
        self.destroy(id, Ok(()));
    }

    pub(super) fn handle_abort(&mut self, id: ThrottleId, graceful: bool) {
        if !self.throttles.contains_key(&id) {
            return; // destroy is idempotent
        }
        self.metrics.record_aborted();
        debug!(%id, graceful, "throttle aborted");
        if graceful {
            self.destroy(id, Ok(()));
        } else {
            self.destroy(id, Err(ThrottleError::Aborted));
        }
    }

    /// Tear a throttle down: resolve the done signal and any outstanding
    /// receipts with `outcome`, close the downstream channel, leave the
    /// in-flight set and stop the clock if the set empties.
    pub(super) fn destroy(&mut self, id: ThrottleId, outcome: Result<(), ThrottleError>) {
        let Some(mut throttle) = self.throttles.remove(&id) else {
            return;
        };
        match outcome {
            Ok(()) => {
                throttle.resolve_done(Ok(()));
                throttle.release_all_waiters();
            }
            Err(e) => {
                throttle.resolve_done(Err(e.clone()));
                throttle.fail_waiters(&e);
            }
        }
        self.on_stop(id);
        // dropping the throttle drops its downstream sender, terminating
        // the reader end
    }

    pub(super) fn on_start(&mut self, id: ThrottleId) {
        self.in_flight.push(id);
        if self.clock.is_none() {
            debug!("first in-flight throttle, starting clock");
            self.clock = Some(TickClock {
                tick_index: 0,
                second_index: 0,
                last_tick: None,
            });
        }
        self.metrics.set_in_flight(self.in_flight.len());
    }

    pub(super) fn on_stop(&mut self, id: ThrottleId) {
        if let Some(pos) = self.in_flight.iter().position(|t| *t == id) {
            self.in_flight.remove(pos);
            if self.in_flight.is_empty() {
                debug!("in-flight set empty, stopping clock");
                self.clock = None;
            }
            self.metrics.set_in_flight(self.in_flight.len());
        }
    }

    pub(super) fn handle_configure(&mut self, update: ConfigUpdate) -> Result<(), ConfigError> {
        let next = match self.config.merged(&update) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "rejected configuration update");
                return Err(e);
            }
        };

        if let Some(clock) = self.clock.as_mut() {
            // A lowered resolution can strand the tick index past the end
            // of the second; roll over into the next one
            if clock.tick_index >= next.ticks_per_second {
                clock.tick_index = 0;
                clock.second_index += 1;
            }
        }
        self.sampler.reconfigure(
            next.throughput_sample_interval_ms,
            next.throughput_sample_size,
        );
        self.next_sample_at = Instant::now() + Duration::from_millis(self.sampler.interval_ms());

        info!(
            bytes_per_second = next.bytes_per_second,
            is_throttled = next.is_throttled,
            "configuration updated"
        );
        self.config = next;
        Ok(())
    }

    /// Fire one throughput sample and notify the observer.
    pub(super) fn run_sample(&mut self) {
        let (sample, reset) = self
            .sampler
            .sample(self.total_bytes_processed, self.config.bytes_per_second);
        if reset {
            self.total_bytes_processed = 0;
        }
        self.metrics.set_throughput(sample);
        if let Some(observer) = self.observer.as_mut() {
            observer(sample);
        }
    }

    pub(super) fn stats(&self) -> GroupStats {
        GroupStats {
            in_flight: self.in_flight.len(),
            clock_running: self.clock.is_some(),
            total_bytes_processed: self.total_bytes_processed,
            bytes_per_second: self.config.bytes_per_second,
            is_throttled: self.config.is_throttled,
            throttles: self
                .throttles
                .values()
                .map(|t| t.stats(self.in_flight.contains(&t.id)))
                .collect(),
        }
    }

    /// Destroy every remaining throttle on shutdown. Streams that already
    /// completed resolved their done signal long ago; the rest observe an
    /// abort.
    pub(super) fn destroy_all(&mut self) {
        let ids: Vec<ThrottleId> = self.throttles.keys().copied().collect();
        for id in ids {
            self.metrics.record_aborted();
            self.destroy(id, Err(ThrottleError::Aborted));
        }
    }
}
