pub mod command;
pub mod handle;
pub mod metrics;
pub mod pacer;
pub mod sampler;
pub mod stats;

mod throttle;

use std::thread;

use tokio::sync::oneshot;
use tracing::info;

use crate::config::{ConfigUpdate, ThrottleConfig};
use crate::error::{ConfigError, GroupError, GroupResult};
use command::{PacerCommand, ThrottleOptions};
use handle::{ThrottleReader, ThrottleWriter};
use pacer::Pacer;
use sampler::ThroughputMetrics;
use stats::GroupStats;

/// The coordinator handle. Owns the pacer thread and the inbound command
/// channel; IO threads talk to the single-threaded pacer exclusively
/// through commands, so no state here needs a lock.
pub struct ThrottleGroup {
    command_tx: crossbeam_channel::Sender<PacerCommand>,
    pacer_thread: Option<thread::JoinHandle<()>>,
}

impl ThrottleGroup {
    /// Create a group, spawning the pacer on a dedicated OS thread.
    pub fn new(config: ThrottleConfig) -> GroupResult<Self> {
        config.validate()?;
        let (tx, rx) = crossbeam_channel::bounded::<PacerCommand>(config.command_channel_capacity);

        let handle = thread::Builder::new()
            .name("vazao-pacer".to_string())
            .spawn(move || {
                let mut pacer = Pacer::new(rx, config);
                pacer.run();
            })
            .map_err(|e| GroupError::PacerSpawn(e.to_string()))?;

        info!("throttle group started");

        Ok(Self {
            command_tx: tx,
            pacer_thread: Some(handle),
        })
    }

    /// Create a throttle, returning its producer and consumer endpoints.
    ///
    /// Blocks briefly on the pacer's reply; inside async code, wrap the
    /// call in `spawn_blocking`.
    pub fn create_throttle(
        &self,
        options: ThrottleOptions,
    ) -> GroupResult<(ThrottleWriter, ThrottleReader)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PacerCommand::CreateThrottle {
            options,
            reply: reply_tx,
        })?;
        let endpoints = reply_rx
            .blocking_recv()
            .map_err(|_| GroupError::ChannelDisconnected)?;
        Ok((
            ThrottleWriter::new(endpoints.id, self.command_tx.clone(), endpoints.done),
            ThrottleReader::new(endpoints.downstream),
        ))
    }

    /// Merge a partial configuration update, taking effect no later than
    /// the pacer's next tick. The returned receiver reports whether the
    /// update was accepted; a rejected update changes nothing.
    pub fn configure(
        &self,
        update: ConfigUpdate,
    ) -> GroupResult<oneshot::Receiver<Result<(), ConfigError>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PacerCommand::Configure {
            update,
            reply: reply_tx,
        })?;
        Ok(reply_rx)
    }

    /// Register the throughput observer, replacing any previous one. It is
    /// invoked on the pacer thread at each sample interval.
    pub fn on_throughput_metrics<F>(&self, observer: F) -> GroupResult<()>
    where
        F: FnMut(ThroughputMetrics) + Send + 'static,
    {
        self.send(PacerCommand::SetThroughputObserver {
            observer: Box::new(observer),
        })
    }

    /// Take an atomic snapshot of the group.
    pub fn stats(&self) -> GroupResult<GroupStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PacerCommand::GetStats { reply: reply_tx })?;
        reply_rx
            .blocking_recv()
            .map_err(|_| GroupError::ChannelDisconnected)
    }

    /// Destroy the group: every throttle is torn down, the sampler and
    /// clock stop, and the pacer thread exits.
    pub fn shutdown(mut self) -> GroupResult<()> {
        info!("initiating group shutdown");

        let _ = self.command_tx.send(PacerCommand::Shutdown);
        if let Some(handle) = self.pacer_thread.take() {
            handle.join().map_err(|_| GroupError::PacerPanicked)?;
        }

        info!("group shutdown complete");
        Ok(())
    }

    fn send(&self, cmd: PacerCommand) -> GroupResult<()> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => GroupError::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => GroupError::ChannelDisconnected,
        })
    }
}

impl Drop for ThrottleGroup {
    fn drop(&mut self) {
        // If shutdown wasn't called explicitly, attempt to stop the pacer
        if self.pacer_thread.is_some() {
            let _ = self.command_tx.send(PacerCommand::Shutdown);
            if let Some(handle) = self.pacer_thread.take() {
                let _ = handle.join();
            }
        }
    }
}
