mod common;

use common::{content_line, ScriptedTransport};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tether_llm::StreamRequest;
use tether_stream::{SessionState, StreamConfig, StreamMessage, StreamPipeline};

fn pipeline(transport: ScriptedTransport, config: StreamConfig) -> StreamPipeline {
    StreamPipeline::new(Arc::new(transport), config).unwrap()
}

fn request() -> StreamRequest {
    StreamRequest::from_prompt("openai/gpt-4o-mini", "Hello")
}

/// Long heartbeat so pings stay out of content assertions
fn quiet_config() -> StreamConfig {
    StreamConfig::default().with_heartbeat_interval(Duration::from_secs(3600))
}

#[tokio::test]
async fn test_content_events_then_done() {
    let transport = ScriptedTransport::new(vec![
        ": OPENROUTER PROCESSING".to_string(),
        content_line("One"),
        ": OPENROUTER PROCESSING".to_string(),
        content_line("Two"),
        content_line("Three"),
        "data: [DONE]".to_string(),
    ]);
    let probe = transport.probe();

    let stream = pipeline(transport, quiet_config()).spawn(request(), None);
    let session = stream.session().clone();
    let messages: Vec<StreamMessage> = stream.collect().await;

    assert_eq!(
        messages,
        vec![
            StreamMessage::content("One"),
            StreamMessage::content("Two"),
            StreamMessage::content("Three"),
            StreamMessage::Done,
        ]
    );
    assert_eq!(session.wait_terminal().await, SessionState::Completed);
    assert_eq!(probe.opens(), 1);
    assert_eq!(probe.drops(), 1);
}

#[tokio::test]
async fn test_event_split_across_deliveries() {
    let transport = ScriptedTransport::new(vec![
        r#"data: {"choices":[{"delta":{"content":"Hel"#,
        r#"lo"}}]}"#,
        "data: [DONE]",
    ]);

    let messages: Vec<StreamMessage> = pipeline(transport, quiet_config())
        .spawn(request(), None)
        .collect()
        .await;

    assert_eq!(messages, vec![StreamMessage::content("Hello"), StreamMessage::Done]);
}

#[tokio::test]
async fn test_done_is_last_and_releases_upstream() {
    let transport = ScriptedTransport::new(vec![
        content_line("A"),
        "data: [DONE]".to_string(),
        content_line("after done"),
    ])
    .hanging();
    let probe = transport.probe();

    let messages: Vec<StreamMessage> = pipeline(transport, quiet_config())
        .spawn(request(), None)
        .collect()
        .await;

    assert_eq!(messages, vec![StreamMessage::content("A"), StreamMessage::Done]);
    assert_eq!(probe.drops(), 1);
}

#[tokio::test]
async fn test_upstream_closing_without_marker_still_ends_with_done() {
    let transport = ScriptedTransport::new(vec![content_line("A"), content_line("B")]);

    let stream = pipeline(transport, quiet_config()).spawn(request(), None);
    let session = stream.session().clone();
    let messages: Vec<StreamMessage> = stream.collect().await;

    assert_eq!(
        messages,
        vec![
            StreamMessage::content("A"),
            StreamMessage::content("B"),
            StreamMessage::Done
        ]
    );
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn test_final_chunk_is_flagged() {
    let transport = ScriptedTransport::new(vec![
        content_line("Hi"),
        r#"data: {"choices":[{"delta":{"content":"!"},"finish_reason":"stop"}]}"#.to_string(),
        "data: [DONE]".to_string(),
    ]);

    let messages: Vec<StreamMessage> = pipeline(transport, quiet_config())
        .spawn(request(), None)
        .collect()
        .await;

    assert_eq!(
        messages,
        vec![
            StreamMessage::content("Hi"),
            StreamMessage::final_content("!"),
            StreamMessage::Done
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_yields_error_then_done() {
    let transport = ScriptedTransport::silent();
    let probe = transport.probe();
    let config = StreamConfig::default()
        .with_heartbeat_interval(Duration::from_secs(1))
        .with_timeout(Duration::from_millis(5500));

    let stream = pipeline(transport, config).spawn(request(), None);
    let session = stream.session().clone();
    let messages: Vec<StreamMessage> = stream.collect().await;

    let pings = messages.iter().filter(|m| m.is_ping()).count();
    assert_eq!(pings, 5);
    assert_eq!(
        &messages[pings..],
        &[
            StreamMessage::error("Stream timed out after 5.5 seconds"),
            StreamMessage::Done
        ]
    );
    assert_eq!(session.state(), SessionState::TimedOut);
    assert_eq!(probe.opens(), 1);
    assert_eq!(probe.drops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_reset_by_activity() {
    let chunks: Vec<String> = (0..100).map(|i| content_line(&i.to_string())).collect();
    let transport = ScriptedTransport::new(chunks).with_chunk_delay(Duration::from_millis(500));
    let config = quiet_config().with_timeout(Duration::from_millis(2200));

    let messages: Vec<StreamMessage> = pipeline(transport, config)
        .spawn(request(), None)
        .collect()
        .await;

    let contents = messages.iter().filter(|m| m.text().is_some()).count();
    assert_eq!(contents, 4);
    assert!(matches!(messages[contents], StreamMessage::Error { .. }));
    assert_eq!(messages.last(), Some(&StreamMessage::Done));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_during_slow_generation() {
    let transport = ScriptedTransport::new(vec![
        content_line("A"),
        content_line("B"),
        "data: [DONE]".to_string(),
    ])
    .with_chunk_delay(Duration::from_millis(2400));
    let config = StreamConfig::default().with_heartbeat_interval(Duration::from_secs(1));

    let messages: Vec<StreamMessage> = pipeline(transport, config)
        .spawn(request(), None)
        .collect()
        .await;

    let pings = messages.iter().filter(|m| m.is_ping()).count();
    let others: Vec<&StreamMessage> = messages.iter().filter(|m| !m.is_ping()).collect();

    assert_eq!(pings, 7);
    assert_eq!(
        others,
        vec![
            &StreamMessage::content("A"),
            &StreamMessage::content("B"),
            &StreamMessage::Done
        ]
    );
    assert_eq!(messages.last(), Some(&StreamMessage::Done));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_consumer_cancels_session() {
    let transport = ScriptedTransport::new(vec![content_line("first")]).hanging();
    let probe = transport.probe();
    let config = StreamConfig::default().with_heartbeat_interval(Duration::from_secs(1));

    let mut stream = pipeline(transport, config).spawn(request(), None);
    let session = stream.session().clone();

    assert_eq!(stream.recv().await, Some(StreamMessage::content("first")));
    assert_eq!(stream.recv().await, Some(StreamMessage::Ping));
    drop(stream);

    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(probe.wait_for_drops(1).await, 1);
    assert_eq!(probe.opens(), 1);
}

#[tokio::test]
async fn test_transport_error_yields_error_then_done() {
    let transport = ScriptedTransport::new(vec![content_line("partial")]).then_fail("connection reset");

    let stream = pipeline(transport, quiet_config()).spawn(request(), None);
    let session = stream.session().clone();
    let messages: Vec<StreamMessage> = stream.collect().await;

    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], StreamMessage::content("partial"));
    match &messages[1] {
        StreamMessage::Error { message } => assert!(message.contains("connection reset")),
        other => panic!("Expected Error, got {:?}", other),
    }
    assert_eq!(messages[2], StreamMessage::Done);
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_open_failure_yields_error_then_done() {
    let transport = ScriptedTransport::failing_open("model unavailable");
    let probe = transport.probe();

    let messages: Vec<StreamMessage> = pipeline(transport, quiet_config())
        .spawn(request(), None)
        .collect()
        .await;

    assert_eq!(messages.len(), 2);
    assert!(matches!(&messages[0], StreamMessage::Error { message } if message.contains("model unavailable")));
    assert_eq!(messages[1], StreamMessage::Done);
    assert_eq!(probe.opens(), 1);
    assert_eq!(probe.drops(), 0);
}

#[tokio::test]
async fn test_provider_error_envelope() {
    let transport = ScriptedTransport::new(vec![
        r#"data: {"error":{"message":"Rate limit exceeded","code":429}}"#,
        "data: [DONE]",
    ]);

    let stream = pipeline(transport, quiet_config()).spawn(request(), None);
    let session = stream.session().clone();
    let messages: Vec<StreamMessage> = stream.collect().await;

    assert_eq!(
        messages,
        vec![StreamMessage::error("Rate limit exceeded"), StreamMessage::Done]
    );
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_slow_consumer_loses_no_content() {
    let chunks: Vec<String> = (0..50).map(|i| content_line(&format!("t{}", i))).collect();
    let transport = ScriptedTransport::new(chunks);
    let config = quiet_config().with_buffer_capacity(2);

    let mut stream = pipeline(transport, config).spawn(request(), None);
    let mut texts = Vec::new();
    while let Some(message) = stream.recv().await {
        tokio::time::sleep(Duration::from_millis(10)).await;
        match message {
            StreamMessage::Content { text, .. } => texts.push(text),
            StreamMessage::Done => break,
            other => panic!("Unexpected message {:?}", other),
        }
    }

    let expected: Vec<String> = (0..50).map(|i| format!("t{}", i)).collect();
    assert_eq!(texts, expected);
    assert_eq!(stream.recv().await, None);
}

#[tokio::test]
async fn test_session_carries_identity() {
    let transport = ScriptedTransport::new(vec!["data: [DONE]"]);

    let stream = pipeline(transport, quiet_config()).spawn(request(), Some("user-42".to_string()));
    let info = stream.session().info().clone();

    assert_eq!(info.model, "openai/gpt-4o-mini");
    assert_eq!(info.user_id.as_deref(), Some("user-42"));
    assert!(!stream.session().id().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = StreamConfig::default().with_buffer_capacity(0);
    assert!(StreamPipeline::new(Arc::new(ScriptedTransport::silent()), config).is_err());
}
