use rdf_traversal_model::Bindings;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Creates the channel that sources forward their records through.
///
/// Without a bound, sources never wait for the consumer to catch up.
pub(crate) fn channel(bound: Option<usize>) -> (RecordSender, RecordReceiver) {
    match bound {
        Some(bound) => {
            let (sender, receiver) = mpsc::channel(bound.max(1));
            (RecordSender::Bounded(sender), RecordReceiver::Bounded(receiver))
        }
        None => {
            let (sender, receiver) = mpsc::unbounded_channel();
            (
                RecordSender::Unbounded(sender),
                RecordReceiver::Unbounded(receiver),
            )
        }
    }
}

#[derive(Clone)]
pub(crate) enum RecordSender {
    Bounded(mpsc::Sender<Bindings>),
    Unbounded(mpsc::UnboundedSender<Bindings>),
}

impl RecordSender {
    /// Returns `false` once the consumer is gone.
    pub(crate) async fn send(&self, bindings: Bindings) -> bool {
        match self {
            RecordSender::Bounded(sender) => sender.send(bindings).await.is_ok(),
            RecordSender::Unbounded(sender) => sender.send(bindings).is_ok(),
        }
    }
}

pub(crate) enum RecordReceiver {
    Bounded(mpsc::Receiver<Bindings>),
    Unbounded(mpsc::UnboundedReceiver<Bindings>),
}

impl RecordReceiver {
    pub(crate) fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bindings>> {
        match self {
            RecordReceiver::Bounded(receiver) => receiver.poll_recv(cx),
            RecordReceiver::Unbounded(receiver) => receiver.poll_recv(cx),
        }
    }
}
