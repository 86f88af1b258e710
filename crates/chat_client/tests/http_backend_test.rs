//! Integration tests for HttpChatBackend against a mock REST server

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chat_client::{ApiError, ChatBackend, ChatRequest, CreateSessionRequest, HttpChatBackend};
use chat_core::Config;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> HttpChatBackend {
    let config = Config {
        api_base: server.uri(),
        max_retries: 2,
        ..Config::default()
    };
    HttpChatBackend::new(&config).expect("backend")
}

#[tokio::test]
async fn test_create_session_accepts_session_id_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions"))
        .and(body_json(json!({"user_id": "default_user", "title": "New chat"})))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "session_abc",
            "title": "New chat"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = backend_for(&server)
        .create_session(CreateSessionRequest {
            user_id: "default_user".to_string(),
            title: "New chat".to_string(),
            project_id: None,
        })
        .await
        .unwrap();
    assert_eq!(session.id, "session_abc");
}

#[tokio::test]
async fn test_get_messages_normalizes_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions/s1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"id": "1", "message_id": 1, "role": "user", "content": "hi",
                 "created_at": "2024-01-01T00:00:00", "parent_id": null, "sibling_index": 0},
                {"id": "2", "message_id": 2, "role": "assistant", "content": "hello",
                 "created_at": "2024-01-01T00:00:01", "parent_id": "1", "sibling_index": 0}
            ]
        })))
        .mount(&server)
        .await;

    let messages = backend_for(&server).get_messages("s1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].parent_id, Some(1));
    assert!(messages[0].is_root());
}

#[tokio::test]
async fn test_list_sessions_passes_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions"))
        .and(query_param("user_id", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessions": [{"session_id": "a", "title": "A"}, {"id": "b", "title": "B"}]
        })))
        .mount(&server)
        .await;

    let sessions = backend_for(&server).list_sessions("alice").await.unwrap();
    let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_fetch_retries_transient_failures() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    Mock::given(method("GET"))
        .and(path("/api/v1/sessions/s1/messages"))
        .respond_with(move |_req: &wiremock::Request| {
            if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"messages": []}))
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let messages = backend_for(&server).get_messages("s1").await.unwrap();
    assert!(messages.is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_send_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "model exploded"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .send_chat(ChatRequest {
            message: "hi".to_string(),
            session_id: "s1".to_string(),
            user_id: "default_user".to_string(),
            model: "gpt-4o".to_string(),
        })
        .await
        .unwrap_err();

    match err {
        ApiError::Status { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "model exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_send_chat_body_and_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .and(body_json(json!({
            "message": "What is 2+2?",
            "session_id": "s1",
            "user_id": "default_user",
            "model": "gpt-4o"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "4",
            "session_id": "s1",
            "agent_type": "general_assistant",
            "message": {"id": "2", "role": "assistant", "content": "4", "parent_id": 1, "sibling_index": 0}
        })))
        .mount(&server)
        .await;

    let response = backend_for(&server)
        .send_chat(ChatRequest {
            message: "What is 2+2?".to_string(),
            session_id: "s1".to_string(),
            user_id: "default_user".to_string(),
            model: "gpt-4o".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.response, "4");
    assert_eq!(response.message.unwrap().parent_id, Some(1));
}

#[tokio::test]
async fn test_update_message_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/messages/7"))
        .and(body_json(json!({"content": "fixed"})))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Message not found"})))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .update_message("7", "fixed")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_bearer_token_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessions": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        api_base: server.uri(),
        api_key: Some("secret".to_string()),
        ..Config::default()
    };
    let backend = HttpChatBackend::new(&config).unwrap();
    assert!(backend.list_sessions("default_user").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_models_reads_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/models"))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"value": "gpt-4o", "label": "GPT-4o"},
                {"value": "deepseek-chat", "label": "DeepSeek Chat"}
            ],
            "default": "gpt-4o"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = backend_for(&server).list_models().await.unwrap();
    assert_eq!(catalog.models.len(), 2);
    assert_eq!(catalog.models[1].label, "DeepSeek Chat");
    assert_eq!(catalog.default.as_deref(), Some("gpt-4o"));
    assert!(catalog.contains("deepseek-chat"));
}

#[tokio::test]
async fn test_list_models_missing_endpoint_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/models"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not Found"})))
        .mount(&server)
        .await;

    let err = backend_for(&server).list_models().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));
}
