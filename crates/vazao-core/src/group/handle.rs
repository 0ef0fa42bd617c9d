use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::{GroupError, GroupResult, ThrottleError};
use crate::group::command::{PacerCommand, ThrottleId};

/// Matures when a written chunk has been accepted — immediately on append,
/// or once the chunk has been fully emitted downstream when the throttle
/// was created with backpressure.
pub type WriteReceipt = oneshot::Receiver<Result<(), ThrottleError>>;

/// Resolves when the throttle has emitted its last byte and stopped:
/// `Ok(())` on graceful completion (or graceful abort), `Err` on overflow
/// or hard abort.
pub type DoneHandle = oneshot::Receiver<Result<(), ThrottleError>>;

/// Producer-side handle of a throttle. Writes are buffered by the pacer
/// and emitted on its clock; the handle itself never blocks on emission.
///
/// Dropping the writer without calling [`end`](Self::end) hard-aborts the
/// stream, discarding any buffered bytes.
pub struct ThrottleWriter {
    id: ThrottleId,
    commands: crossbeam_channel::Sender<PacerCommand>,
    done: Option<DoneHandle>,
    ended: bool,
}

impl ThrottleWriter {
    pub(crate) fn new(
        id: ThrottleId,
        commands: crossbeam_channel::Sender<PacerCommand>,
        done: DoneHandle,
    ) -> Self {
        Self {
            id,
            commands,
            done: Some(done),
            ended: false,
        }
    }

    pub fn id(&self) -> ThrottleId {
        self.id
    }

    /// Append a chunk to the throttle's pending buffer. The returned
    /// receipt may be dropped by callers that do not care when the chunk
    /// lands.
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> GroupResult<WriteReceipt> {
        if self.ended {
            return Err(GroupError::AlreadyEnded);
        }
        let (tx, rx) = oneshot::channel();
        self.send(PacerCommand::Write {
            id: self.id,
            chunk: chunk.into(),
            receipt: tx,
        })?;
        Ok(rx)
    }

    /// Signal end-of-input. Returns the done handle, resolved once the
    /// last buffered byte has been emitted.
    pub fn end(&mut self) -> GroupResult<DoneHandle> {
        if self.ended {
            return Err(GroupError::AlreadyEnded);
        }
        self.send(PacerCommand::EndInput { id: self.id })?;
        self.ended = true;
        self.done.take().ok_or(GroupError::AlreadyEnded)
    }

    /// Hard abort: buffered bytes are discarded and the done signal
    /// resolves with [`ThrottleError::Aborted`]. Idempotent.
    pub fn abort(&mut self) -> GroupResult<()> {
        self.ended = true;
        self.send(PacerCommand::Abort { id: self.id })
    }

    /// Graceful abort: the done signal resolves successfully, then the
    /// throttle is destroyed. Idempotent.
    pub fn graceful_abort(&mut self) -> GroupResult<()> {
        self.ended = true;
        self.send(PacerCommand::GracefulAbort { id: self.id })
    }

    /// Take the done handle without signalling end-of-input, for callers
    /// that want to watch completion while continuing to write.
    pub fn take_done(&mut self) -> Option<DoneHandle> {
        self.done.take()
    }

    fn send(&self, cmd: PacerCommand) -> GroupResult<()> {
        self.commands.try_send(cmd).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => GroupError::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => GroupError::ChannelDisconnected,
        })
    }
}

impl Drop for ThrottleWriter {
    fn drop(&mut self) {
        // A vanished producer that never signalled end-of-input cancels
        // its stream
        if !self.ended {
            let _ = self.commands.try_send(PacerCommand::Abort { id: self.id });
        }
    }
}

/// Consumer-side handle: the emitted slices, in producer order. Dropping
/// the reader detaches the downstream; the pacer notices on its next tick
/// and gracefully aborts the throttle.
pub struct ThrottleReader {
    chunks: mpsc::UnboundedReceiver<Bytes>,
}

impl ThrottleReader {
    pub(crate) fn new(chunks: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { chunks }
    }

    /// Receive the next emitted slice. Returns `None` once the throttle
    /// has been destroyed and all emitted slices were consumed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.chunks.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Bytes, mpsc::error::TryRecvError> {
        self.chunks.try_recv()
    }

    /// Blocking receive, for consumers outside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Bytes> {
        self.chunks.blocking_recv()
    }
}
