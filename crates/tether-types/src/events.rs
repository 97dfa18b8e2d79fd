use serde::{Deserialize, Serialize};

/// Unit delivered to the downstream consumer of a streaming session.
///
/// A session's output always ends with `Done`; failures surface as an
/// `Error` immediately followed by `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Incremental text from the model
    Content {
        text: String,
        /// Set on the provider's final chunk
        #[serde(default)]
        is_final: bool,
    },

    /// Keep-alive heartbeat, never carries content
    Ping,

    /// Terminal failure description
    Error {
        message: String,
    },

    /// End of the session's output
    Done,
}

impl StreamMessage {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_content(text: impl Into<String>) -> Self {
        Self::Content {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping)
    }

    /// Text payload, if this is a content message
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Content { text, .. } => Some(text),
            _ => None,
        }
    }

    /// SSE event name used when the message is written to a client
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Content { .. } => "message",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}
