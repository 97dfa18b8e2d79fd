use crate::session::SessionHandle;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tether_types::{SessionState, StreamMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Consumer end of a streaming session.
///
/// Yields every message in order and ends after `Done`. Dropping it before
/// the end cancels the session: the heartbeat timer and the upstream
/// connection are released.
pub struct MessageStream {
    rx: mpsc::Receiver<StreamMessage>,
    session: SessionHandle,
    task: JoinHandle<()>,
}

impl MessageStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<StreamMessage>,
        session: SessionHandle,
        task: JoinHandle<()>,
    ) -> Self {
        Self { rx, session, task }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Next message, or `None` once the session has finished.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }
}

impl Stream for MessageStream {
    type Item = StreamMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if self.session.finish(SessionState::Cancelled) {
            tracing::info!(request_id = %self.session.id(), "Consumer went away, cancelling stream");
        }
        self.task.abort();
    }
}
