use serde_json::Value;

use crate::streaming::LogicalEvent;

const DATA_PREFIX: &str = "data:";
const COMMENT_PREFIX: char = ':';
const FIELD_PREFIXES: [&str; 3] = ["event:", "id:", "retry:"];

/// Literal payload that ends an upstream stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Largest pending fragment kept before it is given up as malformed (1 MiB)
pub const MAX_PARTIAL_BYTES: usize = 1024 * 1024;

enum Parse {
    Complete(LogicalEvent),
    /// Could still become valid with more text
    Incomplete,
    /// Can never become valid
    Invalid,
}

/// Rebuilds logical events from raw chunks that may split an event anywhere.
///
/// Owns the pending fragment for one session. Each chunk is consumed exactly
/// once: it either completes an event or extends the pending fragment, and the
/// fragment is cleared whenever an event is emitted.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: String,
    ended: bool,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns an event as soon as one is fully formed.
    pub fn try_complete(&mut self, chunk: &str) -> Option<LogicalEvent> {
        if self.ended {
            tracing::trace!(chunk, "Ignoring chunk after end of stream");
            return None;
        }

        let line = chunk.trim_start();

        if self.buffer.is_empty() {
            if line.is_empty() {
                return None;
            }
            if line.starts_with(COMMENT_PREFIX) || is_field_line(line) {
                tracing::debug!(line, "Comment line");
                return Some(LogicalEvent::Comment);
            }
            self.buffer.push_str(chunk);
            return self.resolve();
        }

        let is_data = line.starts_with(DATA_PREFIX);
        let is_comment = line.starts_with(COMMENT_PREFIX);

        if is_data || is_comment {
            if is_data {
                if let Parse::Complete(event) = parse_line(chunk) {
                    tracing::debug!(
                        stale_bytes = self.buffer.len(),
                        "New event while a fragment was pending, dropping the fragment"
                    );
                    self.buffer.clear();
                    return Some(self.mark(event));
                }
            }

            let combined = format!("{}{}", self.buffer, chunk);
            return match parse_line(&combined) {
                Parse::Complete(event) => {
                    self.buffer.clear();
                    Some(self.mark(event))
                }
                // Still a valid prefix, so the chunk belongs to the pending event
                Parse::Incomplete => {
                    self.buffer = combined;
                    self.resolve()
                }
                Parse::Invalid if is_data => {
                    tracing::debug!(
                        stale_bytes = self.buffer.len(),
                        "New data line while a fragment was pending, dropping the fragment"
                    );
                    self.buffer.clear();
                    self.buffer.push_str(chunk);
                    self.resolve()
                }
                Parse::Invalid => {
                    tracing::debug!(line, "Comment line");
                    Some(LogicalEvent::Comment)
                }
            };
        }

        self.buffer.push_str(chunk);
        self.resolve()
    }

    /// Last attempt on whatever is still pending once upstream has completed.
    pub fn finish(&mut self) -> Option<LogicalEvent> {
        if self.ended || self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }

        let raw = std::mem::take(&mut self.buffer);
        match parse_line(&raw) {
            Parse::Complete(event) => Some(self.mark(event)),
            Parse::Incomplete | Parse::Invalid => {
                tracing::debug!(bytes = raw.len(), "Discarding incomplete tail at end of stream");
                Some(LogicalEvent::Malformed { raw })
            }
        }
    }

    /// Whether the end-of-stream sentinel has been seen
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Bytes waiting for the rest of their event
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn resolve(&mut self) -> Option<LogicalEvent> {
        match parse_line(&self.buffer) {
            Parse::Complete(event) => {
                self.buffer.clear();
                Some(self.mark(event))
            }
            Parse::Incomplete if self.buffer.len() > MAX_PARTIAL_BYTES => {
                tracing::warn!(
                    bytes = self.buffer.len(),
                    "Pending fragment exceeded its limit, discarding"
                );
                Some(LogicalEvent::Malformed {
                    raw: std::mem::take(&mut self.buffer),
                })
            }
            Parse::Incomplete => {
                tracing::trace!(bytes = self.buffer.len(), "Waiting for the rest of the event");
                None
            }
            Parse::Invalid => Some(LogicalEvent::Malformed {
                raw: std::mem::take(&mut self.buffer),
            }),
        }
    }

    fn mark(&mut self, event: LogicalEvent) -> LogicalEvent {
        if event == LogicalEvent::EndOfStream {
            self.ended = true;
        }
        event
    }
}

fn parse_line(text: &str) -> Parse {
    let line = text.trim();

    let payload = match line.strip_prefix(DATA_PREFIX) {
        Some(data) => {
            let data = data.trim();
            if data == DONE_SENTINEL {
                return Parse::Complete(LogicalEvent::EndOfStream);
            }
            if DONE_SENTINEL.starts_with(data) {
                return Parse::Incomplete;
            }
            data
        }
        None if DATA_PREFIX.starts_with(line) => return Parse::Incomplete,
        None => line,
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(payload @ Value::Object(_)) => Parse::Complete(LogicalEvent::Content { payload }),
        Ok(_) => Parse::Invalid,
        Err(e) if e.is_eof() => Parse::Incomplete,
        Err(_) => Parse::Invalid,
    }
}

fn is_field_line(line: &str) -> bool {
    FIELD_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}
