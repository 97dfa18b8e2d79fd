#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_llm::{ChunkStream, StreamRequest, TransportError, UpstreamTransport};

/// Counters shared between a [`ScriptedTransport`] and the test body
#[derive(Debug, Clone, Default)]
pub struct Probe {
    opens: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl Probe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Times a chunk stream was released, by completion or cancellation
    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    /// Yield to the runtime until `drops` reaches `expected` or give up
    pub async fn wait_for_drops(&self, expected: usize) -> usize {
        for _ in 0..1000 {
            if self.drops() >= expected {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.drops()
    }
}

struct DropGuard(Arc<AtomicUsize>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

enum Step {
    Chunk(String),
    Fail(String),
}

/// Upstream double that replays a fixed chunk script.
pub struct ScriptedTransport {
    steps: Vec<Step>,
    chunk_delay: Option<Duration>,
    hang: bool,
    open_error: Option<String>,
    probe: Probe,
}

impl ScriptedTransport {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: chunks.into_iter().map(|c| Step::Chunk(c.into())).collect(),
            chunk_delay: None,
            hang: false,
            open_error: None,
            probe: Probe::default(),
        }
    }

    /// Upstream that connects and then never sends anything
    pub fn silent() -> Self {
        Self::new(Vec::<String>::new()).hanging()
    }

    pub fn failing_open(message: impl Into<String>) -> Self {
        let mut transport = Self::new(Vec::<String>::new());
        transport.open_error = Some(message.into());
        transport
    }

    /// Append an in-band transport error after the chunks
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    /// Keep the connection open after the last chunk
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn open(&self, _request: &StreamRequest) -> Result<ChunkStream, TransportError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.open_error {
            return Err(TransportError::Status {
                status: 502,
                message: message.clone(),
            });
        }

        let items: Vec<Result<String, TransportError>> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Chunk(chunk) => Ok(chunk.clone()),
                Step::Fail(message) => Err(TransportError::Stream(message.clone())),
            })
            .collect();
        let delay = self.chunk_delay;
        let hang = self.hang;
        let guard = DropGuard(Arc::clone(&self.probe.drops));

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for item in items {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield item;
            }
            if hang {
                std::future::pending::<()>().await;
            }
        }))
    }
}

pub fn content_line(text: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}
