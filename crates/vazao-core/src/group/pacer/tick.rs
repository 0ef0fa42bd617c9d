use std::time::Instant;

use tracing::debug;

use crate::partition::fair_share;

use super::Pacer;

impl Pacer {
    /// Execute one clock firing.
    ///
    /// The run loop polls at a fifth of the tick duration, so most firings
    /// arrive early and return here without work. A firing that arrives
    /// late by `n` ticks catches up in a single emission of `n` quotas,
    /// keeping aggregate throughput at the configured rate through host
    /// stalls.
    pub fn tick(&mut self, now: Instant) {
        let Some(clock) = self.clock.as_ref() else {
            return;
        };
        let tick_ms = self.config.tick_duration_ms();
        let elapsed_ms = match clock.last_tick {
            Some(last) => now.saturating_duration_since(last).as_millis() as u64,
            None => 0,
        };
        let throttled = !self.config.effectively_unthrottled();
        if throttled && clock.last_tick.is_some() && elapsed_ms < tick_ms {
            return;
        }
        let delay_multiplier = (elapsed_ms / tick_ms).max(1);
        let tick_index = u64::from(clock.tick_index);
        let k = self.in_flight.len() as u64;
        let rot = clock.second_index % k;
        let ticks_per_second = u64::from(self.config.ticks_per_second);

        // Iterate a snapshot: completions and detachments mutate the
        // in-flight list mid-loop
        let snapshot = self.in_flight.clone();
        for (i, id) in snapshot.into_iter().enumerate() {
            let Some(throttle) = self.throttles.get_mut(&id) else {
                continue;
            };
            if throttle.downstream_detached() {
                debug!(%id, "downstream detached, gracefully aborting");
                self.handle_abort(id, true);
                continue;
            }
            let quota = if throttled {
                // The remainder slot walks forward through the set as the
                // seconds advance, so rounding drift cancels across a full
                // rotation cycle
                let j = (i as u64 + k - rot) % k;
                let per_second = fair_share(self.config.bytes_per_second, k, j);
                let per_tick = fair_share(per_second, ticks_per_second, tick_index);
                (per_tick * delay_multiplier) as usize
            } else {
                usize::MAX
            };
            let emitted = throttle.process(quota);
            let complete = throttle.is_complete();
            self.total_bytes_processed += emitted as u64;
            self.metrics.record_emitted(emitted);
            if complete {
                self.finish(id);
            }
        }

        // A completion may have emptied the set and stopped the clock;
        // never step counters on a dead clock
        let ticks_per_second = self.config.ticks_per_second;
        let Some(clock) = self.clock.as_mut() else {
            return;
        };
        clock.tick_index += 1;
        if clock.tick_index >= ticks_per_second {
            clock.tick_index = 0;
            clock.second_index += 1;
        }
        clock.last_tick = Some(now);
        self.metrics.record_tick();
    }
}
