use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::{error::ApiResult, state::AppState};
use tether_llm::{ChatOptions, Message, StreamRequest};
use tether_types::StreamMessage;

#[derive(Debug, Default, Deserialize)]
pub struct StreamChatRequest {
    /// Falls back to `upstream.default_model`
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl StreamChatRequest {
    fn into_stream_request(self, state: &AppState) -> (StreamRequest, Option<String>) {
        let upstream = &state.config.upstream;

        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| upstream.default_model.clone());

        let options = ChatOptions {
            temperature: self.temperature.or(upstream.temperature),
            max_tokens: self.max_tokens.or(upstream.max_tokens),
        };

        let request = StreamRequest {
            model,
            messages: self.messages,
            prompt: self.prompt,
            system_prompt: self.system_prompt,
            options,
        };

        (request, self.user_id)
    }
}

/// Stream a chat completion as Server-Sent Events
///
/// Every message becomes one event named `message`, `ping`, `error` or `done`
/// with the JSON-serialised message as data. A client disconnect drops the
/// stream, which cancels the session.
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StreamChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (request, user_id) = req.into_stream_request(&state);

    // Reject unusable requests before any stream is opened
    request.resolve_messages(state.config.upstream.default_system_prompt.as_deref())?;

    tracing::info!(
        model = %request.model,
        messages = request.messages.len(),
        "Starting streaming completion"
    );

    let messages = state.pipeline.spawn(request, user_id);
    let sse_stream = messages.map(|message| Ok::<Event, Infallible>(to_sse_event(&message)));

    Ok(Sse::new(sse_stream))
}

pub fn to_sse_event(message: &StreamMessage) -> Event {
    Event::default()
        .event(message.event_name())
        .json_data(message)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to serialize stream message: {}", e);
            Event::default()
                .event("error")
                .data(r#"{"type":"error","message":"serialization failed"}"#)
        })
}
