//! Streaming relay tests against a mock SSE upstream.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relaymux::prelude::*;
use relaymux::utils::cancel::make_cancellable_stream;

struct RecordingBilling {
    records: Mutex<Vec<(u64, Usage)>>,
}

impl RecordingBilling {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
        })
    }

    fn records(&self) -> Vec<(u64, Usage)> {
        self.records.lock().unwrap().clone()
    }
}

impl BillingSink for RecordingBilling {
    fn record_usage(&self, channel_id: u64, usage: &Usage) {
        self.records.lock().unwrap().push((channel_id, usage.clone()));
    }
}

fn orchestrator_with_billing(billing: Arc<RecordingBilling>) -> RelayOrchestrator {
    RelayOrchestrator::with_collaborators(
        Arc::new(AdaptorRegistry::with_defaults(reqwest::Client::new())),
        billing,
        Arc::new(TracingTelemetry),
    )
}

fn streaming_chat_body() -> Vec<u8> {
    json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": true
    })
    .to_string()
    .into_bytes()
}

const OPENAI_SSE_BODY: &str = concat!(
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":12,\"total_tokens\":21}}\n\n",
    "data: [DONE]\n\n",
);

async fn relay_stream(
    orchestrator: &RelayOrchestrator,
    ctx: &RelayContext,
    body: &[u8],
) -> RelayStream {
    match orchestrator.relay(ctx, body).await.unwrap() {
        RelayOutput::Stream(stream) => stream,
        RelayOutput::Complete(_) => panic!("expected a streaming response"),
    }
}

#[tokio::test]
async fn openai_stream_forwards_events_and_bills_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(OPENAI_SSE_BODY, "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let billing = RecordingBilling::new();
    let orchestrator = orchestrator_with_billing(billing.clone());
    let ctx = RelayContext::builder(ProviderKind::OpenAi, RelayMode::ChatCompletions)
        .base_url(mock_server.uri())
        .api_key("sk-test")
        .model("gpt-4o")
        .channel_id(5)
        .stream(true)
        .build();

    let mut stream = relay_stream(&orchestrator, &ctx, &streaming_chat_body()).await;
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item.unwrap());
    }
    drop(stream);

    assert!(matches!(events[0], RelayStreamEvent::StreamStart { .. }));
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            RelayStreamEvent::ContentDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    assert!(matches!(
        events.last(),
        Some(RelayStreamEvent::StreamEnd {
            finish_reason: FinishReason::Stop
        })
    ));

    // Usage from the trailing chunk reached billing exactly once.
    assert_eq!(billing.records(), vec![(5, Usage::new(9, 12))]);
}

#[tokio::test]
async fn malformed_mid_stream_event_terminates_with_trailing_error() {
    let mock_server = MockServer::start().await;
    let body = concat!(
        "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"}}]}\n\n",
        "data: {broken json\n\n",
        "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"never seen\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let billing = RecordingBilling::new();
    let orchestrator = orchestrator_with_billing(billing.clone());
    let ctx = RelayContext::builder(ProviderKind::OpenAi, RelayMode::ChatCompletions)
        .base_url(mock_server.uri())
        .api_key("sk-test")
        .model("gpt-4o")
        .channel_id(6)
        .stream(true)
        .build();

    let mut stream = relay_stream(&orchestrator, &ctx, &streaming_chat_body()).await;
    let mut delivered = Vec::new();
    let mut trailing_error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => delivered.push(event),
            Err(err) => trailing_error = Some(err),
        }
    }
    drop(stream);

    // The chunk forwarded before the failure is not retracted.
    assert!(delivered.iter().any(|e| matches!(
        e,
        RelayStreamEvent::ContentDelta { delta, .. } if delta == "partial"
    )));
    let err = trailing_error.expect("stream ends with an error indicator");
    assert_eq!(err.error_code(), "bad_upstream_response");
    // Nothing after the error, and billing still settled exactly once.
    assert_eq!(billing.records().len(), 1);
}

#[tokio::test]
async fn cancelled_stream_stops_promptly_and_settles_billing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(OPENAI_SSE_BODY, "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let billing = RecordingBilling::new();
    let orchestrator = orchestrator_with_billing(billing.clone());
    let ctx = RelayContext::builder(ProviderKind::OpenAi, RelayMode::ChatCompletions)
        .base_url(mock_server.uri())
        .api_key("sk-test")
        .model("gpt-4o")
        .channel_id(8)
        .stream(true)
        .build();

    let stream = relay_stream(&orchestrator, &ctx, &streaming_chat_body()).await;
    let (mut stream, handle) = make_cancellable_stream(stream);

    // Caller consumes one event, then disconnects.
    assert!(stream.next().await.is_some());
    handle.cancel();
    assert!(stream.next().await.is_none());
    drop(stream);

    // Dropping the relayed stream settles billing exactly once even though
    // the usage chunk was never reached.
    assert_eq!(billing.records().len(), 1);
    assert_eq!(billing.records()[0].0, 8);
}

#[tokio::test]
async fn anthropic_stream_accounts_usage_across_events() {
    let mock_server = MockServer::start().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-3-5-sonnet-20241022\",\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":34}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let billing = RecordingBilling::new();
    let orchestrator = orchestrator_with_billing(billing.clone());
    let ctx = RelayContext::builder(ProviderKind::Anthropic, RelayMode::ChatCompletions)
        .base_url(mock_server.uri())
        .api_key("test-api-key")
        .model("claude-3-5-sonnet-20241022")
        .channel_id(4)
        .stream(true)
        .build();

    let request = json!({
        "model": "claude-3-5-sonnet-20241022",
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": true
    });
    let mut stream = relay_stream(&orchestrator, &ctx, request.to_string().as_bytes()).await;
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item.unwrap());
    }
    drop(stream);

    assert!(matches!(events[0], RelayStreamEvent::StreamStart { .. }));
    assert!(matches!(
        events.last(),
        Some(RelayStreamEvent::StreamEnd { .. })
    ));
    // Input tokens from message_start, output tokens from message_delta.
    assert_eq!(billing.records(), vec![(4, Usage::new(25, 34))]);
}
