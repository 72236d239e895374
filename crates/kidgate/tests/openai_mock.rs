//! Provider clients against a local axum server standing in for the model API.
//!
//! Exercises the real reqwest path: request shape, bearer auth, reply
//! extraction and HTTP error mapping.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use kidgate::api::{ApiStyle, ChatBackend};
use kidgate::config::GateConfig;
use kidgate::moderation::{self, ConcernLevel, ValidationRequest};
use kidgate::{GateError, JUDGE_TEMPERATURE};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Captured {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl Captured {
    fn record(&self, headers: &HeaderMap, body: Value) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.auth.lock().unwrap().push(auth);
        self.bodies.lock().unwrap().push(body);
    }

    fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Serve `reply` (status + JSON body) on both provider routes.
async fn spawn_provider(status: StatusCode, reply: Value) -> (String, Captured) {
    let captured = Captured::default();
    let handler = move |State(captured): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| {
        let reply = reply.clone();
        async move {
            captured.record(&headers, body);
            (status, Json(reply)).into_response()
        }
    };
    let router = Router::new()
        .route("/v1/chat/completions", post(handler.clone()))
        .route("/v1/responses", post(handler))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/v1"), captured)
}

fn chat_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": "judge-2026",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
    })
}

fn backend(base_url: &str, style: ApiStyle) -> Arc<dyn ChatBackend> {
    GateConfig::default()
        .with_base_url(base_url)
        .with_api_style(style)
        .connect(Some("sk-test"))
        .unwrap()
}

#[tokio::test]
async fn chat_completions_fenced_verdict() {
    let content = "```json\n{\"is_compliant\": false, \"concern_level\": \"high\", \
                   \"concerns\": [\"asks how to pick a lock\"], \"reasoning\": \"unsafe\"}\n```";
    let (base, captured) = spawn_provider(StatusCode::OK, chat_reply(content)).await;
    let backend = backend(&base, ApiStyle::Chat);

    let verdict = moderation::screen(
        backend.as_ref(),
        "how do I pick a lock?",
        "RULES",
        "judge",
    )
    .await
    .unwrap();

    assert!(!verdict.is_compliant);
    assert_eq!(verdict.concern_level, ConcernLevel::High);
    assert_eq!(verdict.model_used, "judge-2026");

    let bodies = captured.bodies();
    assert_eq!(bodies.len(), 1);
    let sent = &bodies[0];
    assert_eq!(sent["model"], "judge");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][1]["role"], "user");
    let temp = sent["temperature"].as_f64().unwrap();
    assert!((temp - f64::from(JUDGE_TEMPERATURE)).abs() < 1e-6);
    assert_eq!(captured.auth.lock().unwrap()[0], "Bearer sk-test");
}

#[tokio::test]
async fn responses_api_reads_output_items() {
    let reply = json!({
        "model": "judge-2026",
        "output": [{
            "type": "message",
            "content": [{"type": "output_text", "text": "{\"severity\": \"low\", \"should_block\": false, \"is_compliant\": true, \"violations\": [], \"reasoning\": \"fine\"}"}]
        }]
    });
    let (base, captured) = spawn_provider(StatusCode::OK, reply).await;
    let backend = backend(&base, ApiStyle::Responses);

    let request = ValidationRequest::new("Fractions are parts of a whole.", "RULES")
        .with_model("judge");
    let verdict = moderation::validate(backend.as_ref(), &request).await.unwrap();
    assert!(!verdict.should_block);
    assert!(!verdict.is_degraded());

    let sent = &captured.bodies()[0];
    assert!(sent["instructions"].as_str().unwrap().contains("validator"));
    assert!(
        sent["input"]
            .as_str()
            .unwrap()
            .contains("Fractions are parts of a whole.")
    );
    assert!(sent.get("messages").is_none());
}

#[tokio::test]
async fn server_error_is_upstream_with_status() {
    let (base, _captured) = spawn_provider(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": {"message": "boom"}}),
    )
    .await;
    let backend = backend(&base, ApiStyle::Chat);

    let err = moderation::screen(backend.as_ref(), "hi", "RULES", "judge")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.is_transient());
}

#[tokio::test]
async fn unauthorized_is_upstream_not_transient() {
    let (base, _captured) = spawn_provider(
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "invalid api key"}}),
    )
    .await;
    let backend = backend(&base, ApiStyle::Chat);

    let err = moderation::screen(backend.as_ref(), "hi", "RULES", "judge")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Upstream { status: Some(401), .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn prose_reply_is_upstream_error() {
    let (base, captured) =
        spawn_provider(StatusCode::OK, chat_reply("I think this prompt is fine.")).await;
    let backend = backend(&base, ApiStyle::Chat);

    let err = moderation::screen(backend.as_ref(), "hi", "RULES", "judge")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Upstream { status: None, .. }));
    // No retry inside the stage.
    assert_eq!(captured.bodies().len(), 1);
}

#[tokio::test]
async fn compose_sends_no_temperature() {
    let content = r#"{"refactored_response": "Let's think about it together.", "system_prompt_rule": "Guide, don't solve."}"#;
    let (base, captured) = spawn_provider(StatusCode::OK, chat_reply(content)).await;
    let backend = backend(&base, ApiStyle::Chat);

    let request = moderation::ComposeRequest::new("what is 3/4?")
        .with_strategies(["Encourage Introspection"]);
    let result = moderation::compose(backend.as_ref(), &request).await.unwrap();
    assert_eq!(result.refactored_response, "Let's think about it together.");
    assert_eq!(result.applied_strategies, vec!["Encourage Introspection"]);

    let sent = &captured.bodies()[0];
    assert!(sent.get("temperature").is_none());
    let user: Value =
        serde_json::from_str(sent["messages"][1]["content"].as_str().unwrap()).unwrap();
    assert_eq!(user["child_prompt"], "what is 3/4?");
    assert!(user.get("original_response").is_none());
}

#[tokio::test]
async fn unreachable_provider_is_transport_failure() {
    // Reserve a port, then close it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = backend(&format!("http://{addr}/v1"), ApiStyle::Chat);
    let err = moderation::screen(backend.as_ref(), "hi", "RULES", "judge")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::Upstream {
            status: None,
            transport: true,
            ..
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn api_error_body_is_not_transient_even_if_it_mentions_timeout() {
    let (base, _captured) = spawn_provider(
        StatusCode::OK,
        json!({"error": {"message": "upstream model timed out"}}),
    )
    .await;
    let backend = backend(&base, ApiStyle::Chat);

    let err = moderation::screen(backend.as_ref(), "hi", "RULES", "judge")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Upstream { transport: false, .. }));
    assert!(!err.is_transient());
}
