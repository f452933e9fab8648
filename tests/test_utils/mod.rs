//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, body::Body};

use studychat::api::AppState;
use studychat::api::app;
use studychat::core::AppConfig;
use studychat::core::config::DEFAULT_OLLAMA_BASE_URL;

/// Config with every vendor pointed at `upstream`, usually a mockito
/// server standing in for the real API.
pub fn test_config(upstream: &str) -> AppConfig {
    AppConfig {
        request_timeout: Duration::from_secs(5),
        openai_api_hostname: upstream.to_string(),
        anthropic_api_hostname: upstream.to_string(),
        google_api_hostname: upstream.to_string(),
        ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
    }
}

/// Creates a test application router.
pub fn test_app(config: AppConfig) -> Router {
    app(Arc::new(AppState::new(config)))
}

/// Serves `app` on a random local port and returns its base URL.
pub async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// An OpenAI chat completions stream carrying `deltas`.
pub fn openai_sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            serde_json::json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]
            })
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
