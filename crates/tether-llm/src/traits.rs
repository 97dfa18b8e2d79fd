use crate::error::TransportError;
use crate::types::Message;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// One fragment of upstream text, in arrival order. Carries no guarantee that
/// it ends on a wire-event boundary.
pub type RawChunk = String;

/// Live upstream connection. Dropping it cancels the transport.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<RawChunk, TransportError>> + Send>>;

/// Opens a streaming connection to an upstream provider.
///
/// Implementations emit raw chunks in arrival order; completion is the end of
/// the stream, errors are yielded in-band, and cancellation is dropping the
/// returned [`ChunkStream`].
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<ChunkStream, TransportError>;
}

#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Single-turn shortcut used when `messages` is empty
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub options: ChatOptions,
}

impl StreamRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            prompt: None,
            system_prompt: None,
            options: ChatOptions::default(),
        }
    }

    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::new(model, Vec::new())
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Messages to send upstream.
    ///
    /// Uses `messages` when present, otherwise builds a single user turn from
    /// `prompt`. A system message is prepended when none exists and either the
    /// request or `default_system_prompt` provides one.
    pub fn resolve_messages(
        &self,
        default_system_prompt: Option<&str>,
    ) -> Result<Vec<Message>, TransportError> {
        let system_prompt = self
            .system_prompt
            .as_deref()
            .or(default_system_prompt)
            .filter(|s| !s.trim().is_empty());

        let mut messages = if !self.messages.is_empty() {
            self.messages.clone()
        } else {
            match self.prompt.as_deref() {
                Some(prompt) if !prompt.trim().is_empty() => vec![Message::human(prompt)],
                _ => {
                    return Err(TransportError::InvalidRequest(
                        "request must contain either a prompt or messages".to_string(),
                    ))
                }
            }
        };

        if let Some(system_prompt) = system_prompt {
            if !messages.iter().any(Message::is_system) {
                messages.insert(0, Message::system(system_prompt));
            }
        }

        Ok(messages)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_get_default_system_prompt() {
        let request = StreamRequest::new("m", vec![Message::human("Hi")]);
        let messages = request.resolve_messages(Some("Be brief")).unwrap();

        assert_eq!(messages, vec![Message::system("Be brief"), Message::human("Hi")]);
    }

    #[test]
    fn test_existing_system_message_is_kept() {
        let request = StreamRequest::new(
            "m",
            vec![Message::system("Custom"), Message::human("Hi")],
        )
        .with_system_prompt("Ignored");
        let messages = request.resolve_messages(Some("Default")).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content(), "Custom");
    }

    #[test]
    fn test_prompt_builds_user_turn() {
        let request = StreamRequest::from_prompt("m", "What is Rust?").with_system_prompt("Teach");
        let messages = request.resolve_messages(Some("Default")).unwrap();

        assert_eq!(
            messages,
            vec![Message::system("Teach"), Message::human("What is Rust?")]
        );
    }

    #[test]
    fn test_no_system_prompt_available() {
        let request = StreamRequest::from_prompt("m", "Hi");
        let messages = request.resolve_messages(None).unwrap();

        assert_eq!(messages, vec![Message::human("Hi")]);
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let request = StreamRequest::new("m", Vec::new());
        let err = request.resolve_messages(None).unwrap_err();

        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}
