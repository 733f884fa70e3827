use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use crate::traits::ObservabilitySink;
use crate::types::TaskSpan;

/// Span bus using tokio broadcast channel.
/// All subscribers receive all spans.
pub struct SpanBus {
    tx: tokio::sync::broadcast::Sender<TaskSpan>,
}

impl SpanBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, span: TaskSpan) {
        // Ignore error if no receivers
        let _ = self.tx.send(span);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TaskSpan> {
        self.tx.subscribe()
    }
}

impl Default for SpanBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ObservabilitySink for SpanBus {
    fn emit(&self, span: TaskSpan) {
        self.publish(span);
    }
}

/// Take every span currently buffered for `rx`, without waiting.
///
/// Spans that overflowed the bus capacity are skipped; the count is
/// returned alongside.
pub fn drain(rx: &mut Receiver<TaskSpan>) -> (Vec<TaskSpan>, u64) {
    let mut spans = Vec::new();
    let mut skipped = 0;
    loop {
        match rx.try_recv() {
            Ok(span) => spans.push(span),
            Err(TryRecvError::Lagged(n)) => skipped += n,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    (spans, skipped)
}
