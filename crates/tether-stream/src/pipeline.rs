use crate::heartbeat::Heartbeat;
use crate::output::MessageStream;
use crate::session::SessionHandle;
use futures::StreamExt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tether_llm::{classify, FrameReassembler, LogicalEvent, StreamRequest, UpstreamTransport};
use tether_types::{ConfigError, SessionState, StreamConfig, StreamMessage, StreamSession};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::Instrument;

/// Entry point for streaming sessions over one upstream transport.
pub struct StreamPipeline {
    transport: Arc<dyn UpstreamTransport>,
    config: StreamConfig,
}

/// How the content path ended, when it ended before the deadline
#[derive(Debug)]
enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl StreamPipeline {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        config: StreamConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start a session in the background and return its consumer end.
    ///
    /// The upstream connection is opened by the session task, so the returned
    /// stream always yields a terminal message even when opening fails.
    pub fn spawn(&self, request: StreamRequest, user_id: Option<String>) -> MessageStream {
        let mut info = StreamSession::new(request.model.clone(), self.config.clone());
        if let Some(user_id) = user_id {
            info = info.with_user_id(user_id);
        }
        let session = SessionHandle::new(info);

        let (tx, rx) = mpsc::channel(self.config.buffer_capacity);

        let span = tracing::info_span!(
            "stream_session",
            request_id = %session.id(),
            model = %request.model
        );

        let task = tokio::spawn(
            run_session(Arc::clone(&self.transport), request, tx, session.clone()).instrument(span),
        );

        MessageStream::new(rx, session, task)
    }
}

async fn run_session(
    transport: Arc<dyn UpstreamTransport>,
    request: StreamRequest,
    tx: mpsc::Sender<StreamMessage>,
    session: SessionHandle,
) {
    let config = session.config().clone();
    let started = Instant::now();

    tracing::info!(
        user_id = session.info().user_id.as_deref().unwrap_or("-"),
        timeout_secs = config.stream_timeout.as_secs_f64(),
        "Stream session started"
    );

    let heartbeat = Heartbeat::spawn(tx.clone(), started, config.heartbeat_interval);

    // The content path is dropped here on timeout, which closes the upstream
    let outcome = tokio::select! {
        outcome = pump(transport.as_ref(), &request, &tx) => Some(outcome),
        _ = time::sleep_until(started + config.stream_timeout) => None,
    };

    heartbeat.stop().await;

    match outcome {
        Some(Outcome::Completed) => {
            if session.finish(SessionState::Completed) {
                let _ = tx.send(StreamMessage::Done).await;
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Stream completed");
            }
        }
        Some(Outcome::Failed(message)) => {
            if session.finish(SessionState::Failed) {
                tracing::error!(error = %message, "Stream failed");
                terminate_with_error(&tx, message).await;
            }
        }
        Some(Outcome::Cancelled) => {
            if session.finish(SessionState::Cancelled) {
                tracing::info!("Consumer closed the stream");
            }
        }
        None => {
            if session.finish(SessionState::TimedOut) {
                let secs = config.stream_timeout.as_secs_f64();
                tracing::warn!(timeout_secs = secs, "Stream timed out");
                terminate_with_error(&tx, format!("Stream timed out after {} seconds", secs)).await;
            }
        }
    }
}

async fn terminate_with_error(tx: &mpsc::Sender<StreamMessage>, message: String) {
    if tx.send(StreamMessage::Error { message }).await.is_ok() {
        let _ = tx.send(StreamMessage::Done).await;
    }
}

/// Content path: transport -> reassembler -> classifier -> output channel.
async fn pump(
    transport: &dyn UpstreamTransport,
    request: &StreamRequest,
    tx: &mpsc::Sender<StreamMessage>,
) -> Outcome {
    let mut chunks = match transport.open(request).await {
        Ok(chunks) => chunks,
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    let mut reassembler = FrameReassembler::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        tracing::trace!(chunk = %chunk, "Upstream chunk");

        if let Some(event) = reassembler.try_complete(&chunk) {
            if let ControlFlow::Break(outcome) = forward(event, tx).await {
                return outcome;
            }
        }
    }

    if let Some(event) = reassembler.finish() {
        if let ControlFlow::Break(outcome) = forward(event, tx).await {
            return outcome;
        }
    }

    tracing::debug!("Upstream closed without an end-of-stream marker");
    Outcome::Completed
}

async fn forward(event: LogicalEvent, tx: &mpsc::Sender<StreamMessage>) -> ControlFlow<Outcome> {
    match classify(event) {
        None => ControlFlow::Continue(()),
        Some(StreamMessage::Done) => ControlFlow::Break(Outcome::Completed),
        Some(StreamMessage::Error { message }) => ControlFlow::Break(Outcome::Failed(message)),
        Some(message) => match tx.send(message).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(Outcome::Cancelled),
        },
    }
}
