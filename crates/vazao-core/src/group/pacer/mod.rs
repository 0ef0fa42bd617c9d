use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::config::ThrottleConfig;
use crate::group::command::{PacerCommand, ThrottleId, ThroughputFn};
use crate::group::metrics::Metrics;
use crate::group::sampler::ThroughputSampler;
use crate::group::throttle::Throttle;

mod handlers;
mod tick;

/// Clock counters, present exactly while the in-flight list is nonempty.
struct TickClock {
    /// Position within the current second, `[0, ticks_per_second)`.
    tick_index: u32,
    second_index: u64,
    /// Monotonic time of the last executed tick; `None` until the first.
    last_tick: Option<Instant>,
}

/// Single-threaded coordinator core. Owns every throttle, the in-flight
/// list, the tick clock and the throughput sampler, and processes commands
/// from IO threads via a crossbeam channel. No locks anywhere — correctness
/// comes from single ownership.
///
/// `ThrottleGroup` is the intended front door; the pacer is public so the
/// clocked emission path can be driven directly with synthetic instants
/// (benches do this, as do the tests).
pub struct Pacer {
    inbound: Receiver<PacerCommand>,
    config: ThrottleConfig,
    running: bool,
    next_id: ThrottleId,
    /// All live throttles, creation-ordered.
    throttles: BTreeMap<ThrottleId, Throttle>,
    /// Currently in-flight throttles, insertion-ordered.
    in_flight: Vec<ThrottleId>,
    clock: Option<TickClock>,
    /// Bytes emitted since the sampler last reset it.
    total_bytes_processed: u64,
    sampler: ThroughputSampler,
    next_sample_at: Instant,
    observer: Option<ThroughputFn>,
    metrics: Metrics,
}

impl Pacer {
    pub fn new(inbound: Receiver<PacerCommand>, config: ThrottleConfig) -> Self {
        let sampler = ThroughputSampler::new(
            config.throughput_sample_interval_ms,
            config.throughput_sample_size,
        );
        let next_sample_at = Instant::now() + Duration::from_millis(sampler.interval_ms());
        Self {
            inbound,
            config,
            running: true,
            next_id: 0,
            throttles: BTreeMap::new(),
            in_flight: Vec::new(),
            clock: None,
            total_bytes_processed: 0,
            sampler,
            next_sample_at,
            observer: None,
            metrics: Metrics::new(),
        }
    }

    /// Drain every buffered command without parking. The run loop does
    /// this at the top of each iteration; callers driving the pacer
    /// manually (tests, benches) use it between synthetic ticks.
    pub fn handle_all_pending(&mut self) {
        while let Ok(cmd) = self.inbound.try_recv() {
            self.handle_command(cmd);
        }
    }

    /// Run the pacer event loop. Blocks the current thread until a
    /// `Shutdown` command arrives or the inbound channel disconnects.
    pub(crate) fn run(&mut self) {
        info!("pacer started");

        while self.running {
            // Phase 1: drain all buffered commands (non-blocking)
            let mut drained = 0;
            while let Ok(cmd) = self.inbound.try_recv() {
                self.handle_command(cmd);
                drained += 1;
                if !self.running {
                    break;
                }
            }
            if !self.running {
                break;
            }

            // Phase 2: clock and sampler work
            let now = Instant::now();
            self.tick(now);
            if now >= self.next_sample_at {
                self.run_sample();
                self.next_sample_at = now + Duration::from_millis(self.sampler.interval_ms());
            }

            // Phase 3: park until the next command, tick poll or sample
            if drained == 0 {
                match self.inbound.recv_timeout(self.park_timeout(now)) {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        info!("inbound channel disconnected, shutting down");
                        self.running = false;
                    }
                }
            }
        }

        self.destroy_all();
        info!("pacer stopped");
    }

    /// While the clock runs, poll at a fifth of the tick so the executed
    /// phase stays tight against the intended phase on jittery host timers;
    /// `tick()` skips firings that arrive early. Idle groups park until the
    /// next sampler deadline.
    fn park_timeout(&self, now: Instant) -> Duration {
        let to_sample = self
            .next_sample_at
            .saturating_duration_since(now)
            .max(Duration::from_millis(1));
        if self.clock.is_some() {
            let poll = Duration::from_millis((self.config.tick_duration_ms() / 5).max(1));
            poll.min(to_sample)
        } else {
            to_sample
        }
    }

    fn handle_command(&mut self, cmd: PacerCommand) {
        match cmd {
            PacerCommand::CreateThrottle { options, reply } => {
                let endpoints = self.create_throttle(options);
                let _ = reply.send(endpoints);
            }
            PacerCommand::Write { id, chunk, receipt } => {
                debug!(%id, len = chunk.len(), "write command received");
                self.handle_write(id, chunk, receipt);
            }
            PacerCommand::EndInput { id } => {
                debug!(%id, "end-of-input received");
                self.handle_end_input(id);
            }
            PacerCommand::Abort { id } => {
                self.handle_abort(id, false);
            }
            PacerCommand::GracefulAbort { id } => {
                self.handle_abort(id, true);
            }
            PacerCommand::Configure { update, reply } => {
                let _ = reply.send(self.handle_configure(update));
            }
            PacerCommand::SetThroughputObserver { observer } => {
                self.observer = Some(observer);
            }
            PacerCommand::GetStats { reply } => {
                let _ = reply.send(self.stats());
            }
            PacerCommand::Shutdown => {
                info!("shutdown command received");
                self.running = false;
            }
        }
    }
}

#[cfg(test)]
mod tests;
