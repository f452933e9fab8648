//! Sends chat turns to the server and reads back the event stream.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::ai::chat::StreamEvent;
use crate::api::public::chat::{ChatRequest, DONE_MARKER};
use crate::core::sse::{FrameBuffer, parse_event};
use crate::core::upstream::{error_message, frames};

#[derive(Debug, Error)]
pub enum TransportError {
    /// The server refused the request itself: unknown provider, missing
    /// key or a body it could not read
    #[error("{0}")]
    InvalidSettings(String),
    /// The server answered with an error body instead of a stream
    #[error("{0}")]
    Rejected(String),
    #[error("Could not reach the chat server: {0}")]
    Connect(#[from] reqwest::Error),
    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

pub type EventStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: ChatRequest) -> Result<EventStream, TransportError>;
}

pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `server` is the base URL of a running chat server, e.g.
    /// `http://127.0.0.1:2222`.
    pub fn new(server: &str) -> Self {
        Self {
            endpoint: format!("{}/api/chat", server.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: ChatRequest) -> Result<EventStream, TransportError> {
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| format!("Chat request failed with status {}", status));
            if status == reqwest::StatusCode::BAD_REQUEST {
                return Err(TransportError::InvalidSettings(message));
            }
            return Err(TransportError::Rejected(message));
        }

        let events: EventStream = Box::pin(async_stream::try_stream! {
            let mut frames = frames(response, FrameBuffer::sse());
            while let Some(frame) = frames.next().await {
                let frame = frame.map_err(|e| TransportError::Interrupted(e.to_string()))?;
                let Some(event) = parse_event(&frame) else {
                    continue;
                };
                if event.data == DONE_MARKER {
                    break;
                }
                let event = serde_json::from_str::<StreamEvent>(&event.data)
                    .map_err(|e| TransportError::Interrupted(e.to_string()))?;
                yield event;
            }
        });

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::chat::{ChatMessage, Role};

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::new(Role::User, "Hi")],
            provider: Some("openai".to_string()),
            api_key: Some("sk-test".to_string()),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_send_streams_events() {
        let mut server = mockito::Server::new_async().await;

        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"type\":\"text-delta\",\"delta\":\"Hel\"}\n\n",
            "data: {\"type\":\"text-delta\",\"delta\":\"lo\"}\n\n",
            "data: {\"type\":\"finish\"}\n\n",
            "data: [DONE]\n\n",
        );
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"provider":"openai","apiKey":"sk-test"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create();

        let transport = HttpTransport::new(&format!("{}/", server.url()));
        let events: Vec<StreamEvent> = transport
            .send(request())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        mock.assert();
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    delta: "Hel".into()
                },
                StreamEvent::TextDelta { delta: "lo".into() },
                StreamEvent::Finish,
            ]
        );
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Invalid provider"}"#)
            .create();

        let transport = HttpTransport::new(&server.url());
        match transport.send(request()).await {
            Err(TransportError::InvalidSettings(msg)) => assert_eq!(msg, "Invalid provider"),
            Err(e) => panic!("Unexpected error {}", e),
            Ok(_) => panic!("Expected a rejection"),
        }
    }

    #[tokio::test]
    async fn test_send_provider_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid x-api-key"}"#)
            .create();

        let transport = HttpTransport::new(&server.url());
        match transport.send(request()).await {
            Err(TransportError::Rejected(msg)) => assert_eq!(msg, "invalid x-api-key"),
            Err(e) => panic!("Unexpected error {}", e),
            Ok(_) => panic!("Expected a rejection"),
        }
    }
}
