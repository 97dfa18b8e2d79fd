use futures::{Stream, StreamExt};
use std::collections::VecDeque;

use crate::error::TransportError;
use crate::traits::ChunkStream;

/// Byte accumulator for line-based decoding.
/// Multi-byte characters are never split because lines only end on `\n`.
pub struct LineBuffer {
    buffer: VecDeque<u8>,
}

impl LineBuffer {
    /// Create a new buffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract next line (up to \n) without its line terminator.
    /// Returns None if no complete line is available
    pub fn next_line(&mut self) -> Option<String> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();

        Some(Self::decode(&line_bytes))
    }

    /// Take whatever is left after the last newline
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let bytes: Vec<u8> = self.buffer.drain(..).collect();
        Some(Self::decode(&bytes))
    }

    /// Current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn decode(bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        text.trim_end_matches(&['\r', '\n'][..]).to_string()
    }
}

/// Re-frame a byte stream into one raw chunk per non-empty line.
///
/// An unterminated tail is emitted as a final chunk when the byte stream ends.
/// The first error ends the stream.
pub fn decode_lines<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = LineBuffer::with_capacity(4096);

        while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(chunk) => {
                    buffer.extend(chunk.as_ref());

                    while let Some(line) = buffer.next_line() {
                        if !line.trim().is_empty() {
                            yield Ok(line);
                        }
                    }
                }
                Err(e) => {
                    let error: TransportError = e.into();
                    yield Err(error);
                    return;
                }
            }
        }

        if let Some(tail) = buffer.take_remainder() {
            if !tail.trim().is_empty() {
                tracing::debug!(bytes = tail.len(), "Upstream ended with an unterminated line");
                yield Ok(tail);
            }
        }
    })
}
