//! Execution event sink.
//!
//! The engine emits progress events through this trait; the transport to the
//! caller (channel, SSE stream, log) is the implementation's business.

use tokio::sync::mpsc;

use crate::domain::ExecutionEvent;

/// Receives execution events in emission order.
pub trait ExecutionEventSink: Send + Sync {
    /// Emit one event. Must not block.
    fn emit(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl NoopEventSink {
    pub const fn new() -> Self {
        Self
    }
}

impl ExecutionEventSink for NoopEventSink {
    fn emit(&self, _event: ExecutionEvent) {}
}

/// Forwards events into an unbounded channel.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelEventSink {
    pub const fn new(tx: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ExecutionEventSink for ChannelEventSink {
    fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }
}
