//! End-to-end stream tests against a mock backend.

use std::time::Duration;

use mandi_core::config::Config;
use mandi_core::core::{
    ChatController, ChatUpdate, EntryKind, SignalReceiver, TranscriptMutation,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wrap newline-delimited data records in a streaming response.
fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

fn stream_body(records: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for record in records {
        body.push_str(&format!("data: {record}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn config_for(server: &MockServer) -> Config {
    Config {
        base_url: server.uri(),
        ..Config::default()
    }
}

fn kinds(controller: &ChatController) -> Vec<EntryKind> {
    controller
        .transcript()
        .entries()
        .iter()
        .map(|e| e.body.kind())
        .collect()
}

/// Pumps controller signals until the active request finishes.
async fn drive_to_finish(
    controller: &mut ChatController,
    rx: &mut SignalReceiver,
) -> Vec<ChatUpdate> {
    let mut all = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(signal) = rx.recv().await {
            let updates = controller.handle(signal);
            let finished = updates
                .iter()
                .any(|u| matches!(u, ChatUpdate::RequestFinished { .. }));
            all.extend(updates);
            if finished {
                break;
            }
        }
    })
    .await;
    drained.expect("request did not finish in time");
    all
}

#[tokio::test]
async fn test_clean_round_trip_builds_transcript() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(sse_response(&stream_body(&[
            serde_json::json!({"type": "thinking", "message": "Searching", "session_id": "s-9"}),
            serde_json::json!({"type": "raw_products", "products": [
                {"id": "p1", "name": "Basmati Rice", "price": 120.0},
            ]}),
            serde_json::json!({"type": "response", "content": "Found 1 product"}),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("find rice");
    let updates = drive_to_finish(&mut controller, &mut rx).await;

    // Thinking was swept at the terminal response; durable entries remain.
    assert_eq!(
        kinds(&controller),
        vec![EntryKind::User, EntryKind::ProductList, EntryKind::BotText]
    );
    assert_eq!(controller.session_id(), Some("s-9"));
    assert_eq!(
        updates
            .iter()
            .filter(|u| matches!(u, ChatUpdate::RequestFinished { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_malformed_frames_do_not_kill_the_stream() {
    let mock_server = MockServer::start().await;
    let body = format!(
        "data: {{not json\n\ndata: {}\n\ndata: [DONE]\n\n",
        serde_json::json!({"type": "response", "content": "Still here"})
    );
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(sse_response(&body))
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("hello");
    drive_to_finish(&mut controller, &mut rx).await;

    assert_eq!(kinds(&controller), vec![EntryKind::User, EntryKind::BotText]);
}

#[tokio::test]
async fn test_second_message_supersedes_delayed_first() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .and(body_string_contains("first"))
        .respond_with(
            sse_response(&stream_body(&[
                serde_json::json!({"type": "response", "content": "late reply"}),
            ]))
            .set_delay(Duration::from_millis(400)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .and(body_string_contains("second"))
        .respond_with(sse_response(&stream_body(&[
            serde_json::json!({"type": "response", "content": "fresh reply"}),
        ])))
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("first");
    controller.send_message("second");
    drive_to_finish(&mut controller, &mut rx).await;

    let entries = controller.transcript().entries();
    assert_eq!(
        kinds(&controller),
        vec![EntryKind::User, EntryKind::User, EntryKind::BotText]
    );
    let mandi_core::core::EntryBody::BotText { text } = &entries[2].body else {
        panic!("expected BotText");
    };
    assert_eq!(text, "fresh reply");
}

#[tokio::test]
async fn test_http_error_records_durable_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(r#"{"detail": "backend exploded"}"#),
        )
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("find rice");
    let updates = drive_to_finish(&mut controller, &mut rx).await;

    assert_eq!(kinds(&controller), vec![EntryKind::User, EntryKind::Error]);
    assert_eq!(
        updates
            .iter()
            .filter(|u| matches!(u, ChatUpdate::RequestFinished { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_server_error_event_is_durable_but_not_fatal() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(sse_response(&stream_body(&[
            serde_json::json!({"type": "thinking", "message": "Working"}),
            serde_json::json!({"type": "error", "message": "quota exhausted"}),
        ])))
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("find rice");
    drive_to_finish(&mut controller, &mut rx).await;

    assert_eq!(kinds(&controller), vec![EntryKind::User, EntryKind::Error]);
}

#[tokio::test]
async fn test_device_tag_applies_to_first_message_only() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(sse_response(&stream_body(&[
            serde_json::json!({"type": "response", "content": "ok"}),
        ])))
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), Some("d-1")).unwrap();
    controller.send_message("hello");
    drive_to_finish(&mut controller, &mut rx).await;
    controller.send_message("again");
    drive_to_finish(&mut controller, &mut rx).await;

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let first = String::from_utf8_lossy(&requests[0].body).to_string();
    let second = String::from_utf8_lossy(&requests[1].body).to_string();
    assert!(first.contains("[Device: d-1] hello"));
    assert!(second.contains("again"));
    assert!(!second.contains("[Device:"));
}

#[tokio::test]
async fn test_captured_session_id_is_sent_on_next_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(sse_response(&stream_body(&[
            serde_json::json!({"type": "response", "content": "ok", "session_id": "s-42"}),
        ])))
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("hello");
    drive_to_finish(&mut controller, &mut rx).await;
    controller.send_message("again");
    drive_to_finish(&mut controller, &mut rx).await;

    let requests = mock_server.received_requests().await.unwrap();
    let first = String::from_utf8_lossy(&requests[0].body).to_string();
    let second = String::from_utf8_lossy(&requests[1].body).to_string();
    assert!(first.contains("\"session_id\":null"));
    assert!(second.contains("s-42"));
}

#[tokio::test]
async fn test_cart_stream_updates_summary_state() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(sse_response(&stream_body(&[
            serde_json::json!({"type": "raw_cart",
                "cart_items": [{"id": "i1", "name": "Rice", "quantity": 2, "price": 45.0}],
                "cart_summary": {"total_items": 2, "total_value": 90.0}}),
            serde_json::json!({"type": "response", "content": "Cart updated"}),
        ])))
        .mount(&mock_server)
        .await;

    let (mut controller, mut rx) =
        ChatController::new(&config_for(&mock_server), None).unwrap();
    controller.send_message("add rice");
    let updates = drive_to_finish(&mut controller, &mut rx).await;

    assert!(updates.iter().any(|u| matches!(
        u,
        ChatUpdate::Transcript(TranscriptMutation::CartSummary(_))
    )));
    assert_eq!(controller.transcript().cart_summary().total_items, 2);
    assert_eq!(
        kinds(&controller),
        vec![EntryKind::User, EntryKind::CartView, EntryKind::BotText]
    );
}
