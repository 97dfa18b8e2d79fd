use serde::Deserialize;
use serde_json::Value;
use tether_types::StreamMessage;

/// One complete wire-protocol unit produced by the [`FrameReassembler`].
///
/// [`FrameReassembler`]: crate::buffer_utils::FrameReassembler
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalEvent {
    /// A `data:` payload (or bare line) that parsed to a JSON object
    Content { payload: Value },

    /// Comment or SSE field line, never surfaced downstream
    Comment,

    /// The `[DONE]` sentinel
    EndOfStream,

    /// Text that can never become a valid event
    Malformed { raw: String },
}

/// Result of reading the provider envelope of a content event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Content { text: String, is_final: bool },
    /// The envelope reports a provider-side failure
    ProviderError(String),
    /// Valid event without any recognised text field
    Missing,
}

// Provider envelopes vary; every field is optional and unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<TextHolder>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<TextHolder>,
    #[serde(default)]
    finish_reason: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TextHolder {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the incremental text out of a provider payload.
///
/// Looks at `choices[0].delta.content`, `choices[0].text`,
/// `choices[0].message.content` and finally a top-level `content`, which may
/// itself hold a nested JSON envelope. A non-null `finish_reason` marks the
/// final chunk.
pub fn extract(payload: &Value) -> Extraction {
    let envelope = match Envelope::deserialize(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "Unrecognised provider envelope");
            return Extraction::Missing;
        }
    };

    if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
        return Extraction::ProviderError(describe_provider_error(&error));
    }

    if let Some(choice) = envelope.choices.into_iter().next() {
        let is_final = choice.finish_reason.is_some();
        // An empty field falls through to the next one
        let text = choice
            .delta
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty())
            .or(choice.text.filter(|text| !text.is_empty()))
            .or_else(|| choice.message.and_then(|m| m.content))
            .filter(|text| !text.is_empty());

        return match text {
            Some(text) => Extraction::Content { text, is_final },
            None if is_final => Extraction::Content {
                text: String::new(),
                is_final,
            },
            None => Extraction::Missing,
        };
    }

    match envelope.content {
        Some(Value::String(text)) => {
            if text.trim_start().starts_with('{') {
                if let Ok(nested @ Value::Object(_)) = serde_json::from_str::<Value>(&text) {
                    return extract(&nested);
                }
            }
            Extraction::Content {
                text,
                is_final: false,
            }
        }
        Some(nested @ Value::Object(_)) => extract(&nested),
        _ => Extraction::Missing,
    }
}

fn describe_provider_error(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// Map a logical event to the message delivered downstream, if any.
pub fn classify(event: LogicalEvent) -> Option<StreamMessage> {
    match event {
        LogicalEvent::Content { payload } => match extract(&payload) {
            Extraction::Content { text, is_final } => {
                if text.is_empty() && !is_final {
                    return None;
                }
                Some(StreamMessage::Content { text, is_final })
            }
            Extraction::ProviderError(message) => Some(StreamMessage::Error { message }),
            Extraction::Missing => {
                tracing::debug!(payload = %payload, "No text in content event, skipping");
                None
            }
        },
        LogicalEvent::EndOfStream => Some(StreamMessage::Done),
        LogicalEvent::Comment => None,
        LogicalEvent::Malformed { raw } => {
            tracing::debug!(bytes = raw.len(), raw = %raw, "Discarding malformed frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_delta_content() {
        let payload = json!({"choices": [{"delta": {"content": "Hi"}, "finish_reason": null}]});
        assert_eq!(
            extract(&payload),
            Extraction::Content {
                text: "Hi".to_string(),
                is_final: false
            }
        );
    }

    #[test]
    fn test_empty_delta_falls_back_to_text() {
        let payload = json!({"choices": [{"delta": {"content": ""}, "text": "Hi"}]});
        assert_eq!(
            extract(&payload),
            Extraction::Content {
                text: "Hi".to_string(),
                is_final: false
            }
        );

        let payload = json!({"choices": [{"text": "", "message": {"content": "Hey"}}]});
        assert_eq!(
            extract(&payload),
            Extraction::Content {
                text: "Hey".to_string(),
                is_final: false
            }
        );
    }

    #[test]
    fn test_finish_reason_marks_final() {
        let payload = json!({"choices": [{"delta": {}, "finish_reason": "stop"}]});
        assert_eq!(
            classify(LogicalEvent::Content { payload }),
            Some(StreamMessage::final_content(""))
        );
    }

    #[test]
    fn test_empty_delta_is_absorbed() {
        let payload = json!({"choices": [{"delta": {"role": "assistant", "content": ""}}]});
        assert_eq!(classify(LogicalEvent::Content { payload }), None);
    }

    #[test]
    fn test_comment_and_malformed_are_absorbed() {
        assert_eq!(classify(LogicalEvent::Comment), None);
        assert_eq!(
            classify(LogicalEvent::Malformed {
                raw: "{oops".to_string()
            }),
            None
        );
    }

    #[test]
    fn test_end_of_stream_is_done() {
        assert_eq!(classify(LogicalEvent::EndOfStream), Some(StreamMessage::Done));
    }
}
