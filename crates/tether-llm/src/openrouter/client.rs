// OpenRouter (OpenAI-compatible) streaming transport

use crate::buffer_utils::decode_lines;
use crate::error::TransportError;
use crate::traits::{ChunkStream, StreamRequest, UpstreamTransport};
use crate::types::Message;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;

pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Streaming chat-completions client for OpenRouter and other
/// OpenAI-compatible endpoints.
///
/// Only a connect timeout is applied; total stream duration is bounded by the
/// caller.
#[derive(Debug)]
pub struct OpenRouterClient {
    http_client: reqwest::Client,
    base_url: String,
    default_system_prompt: Option<String>,
}

impl OpenRouterClient {
    pub fn builder() -> OpenRouterClientBuilder {
        OpenRouterClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_body<'a>(
        &self,
        request: &'a StreamRequest,
        messages: &'a [Message],
    ) -> ChatCompletionBody<'a> {
        ChatCompletionBody {
            model: &request.model,
            messages,
            stream: true,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Builder for OpenRouterClient
#[derive(Default)]
pub struct OpenRouterClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    app_name: Option<String>,
    referer: Option<String>,
    default_system_prompt: Option<String>,
    connect_timeout: Option<Duration>,
}

impl OpenRouterClientBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the API base, e.g. "http://localhost:1234/v1"
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sent as `X-Title`
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Sent as `HTTP-Referer`
    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn default_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = Some(prompt.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<OpenRouterClient, TransportError> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TransportError::Config("API key is required".to_string()))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| OPENROUTER_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
        if let Some(referer) = &self.referer {
            headers.insert("http-referer", header_value(referer)?);
        }
        if let Some(app_name) = &self.app_name {
            headers.insert("x-title", header_value(app_name)?);
        }

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()?;

        Ok(OpenRouterClient {
            http_client,
            base_url,
            default_system_prompt: self.default_system_prompt,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Config(format!("Invalid header value: {}", e)))
}

#[async_trait]
impl UpstreamTransport for OpenRouterClient {
    async fn open(&self, request: &StreamRequest) -> Result<ChunkStream, TransportError> {
        let messages = request.resolve_messages(self.default_system_prompt.as_deref())?;
        let body = self.build_body(request, &messages);

        tracing::debug!(
            model = %request.model,
            messages = messages.len(),
            "Opening upstream stream"
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let message = describe_error_body(&error_text);
            tracing::error!(status, message = %message, "Upstream rejected the stream request");
            return Err(TransportError::Status { status, message });
        }

        Ok(decode_lines(response.bytes_stream()))
    }
}

/// Readable message from an upstream error body: the JSON `error.message`,
/// an HTML page's `<title>` or `<h1>`, or the body itself, truncated.
pub fn describe_error_body(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return message.to_string();
        }
    }

    if let Some(title) = html_element(body, "title").filter(|t| !t.eq_ignore_ascii_case("OpenRouter")) {
        return title;
    }
    if let Some(heading) = html_element(body, "h1") {
        return heading;
    }

    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

fn html_element(html: &str, tag: &str) -> Option<String> {
    let open = html.find(&format!("<{}", tag))?;
    let content_start = open + html[open..].find('>')? + 1;
    let content_len = html[content_start..].find(&format!("</{}>", tag))?;
    let text = strip_tags(&html[content_start..content_start + content_len]);

    (!text.is_empty()).then_some(text)
}

fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.trim().to_string()
}
