//! Streaming client for the Anthropic Messages API.
//!
//! The API streams server-sent events. Text arrives in
//! `content_block_delta` events and the message ends with
//! `message_stop`. Errors that happen after the response has started
//! are delivered in-band as an `error` event.

use anyhow::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::ai::chat::Role;
use crate::ai::provider::ModelRequest;
use crate::core::sse::{FrameBuffer, parse_event};
use crate::core::upstream::{check_status, frames};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Serialize, Debug)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

/// Streaming events from the Messages API.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Incremental update to a content block
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: Delta },

    /// End of the message
    #[serde(rename = "message_stop")]
    MessageStop,

    /// An error after the stream started, e.g. `overloaded_error`
    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    /// `message_start`, `content_block_start`, `ping` and friends
    #[serde(other)]
    Other,
}

/// Delta updates for content blocks
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum Delta {
    /// Text content delta
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

pub struct AnthropicClient {
    api_hostname: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Streams the reply to `request` as text deltas.
    pub fn messages_stream(&self, request: ModelRequest) -> BoxStream<'static, Result<String>> {
        let url = format!("{}/v1/messages", self.api_hostname);
        let api_key = self.api_key.clone();
        let model = self.model.clone();

        Box::pin(async_stream::try_stream! {
            let payload = MessagesRequest {
                model: &model,
                max_tokens: MAX_TOKENS,
                system: &request.system,
                messages: request
                    .messages
                    .iter()
                    .map(|m| Message {
                        role: match m.role {
                            Role::User => "user",
                            Role::Assistant => "assistant",
                        },
                        content: &m.content,
                    })
                    .collect(),
                stream: true,
            };
            let response = reqwest::Client::new()
                .post(url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&payload)
                .send()
                .await?;
            let response = check_status(response, "anthropic").await?;

            let mut frames = frames(response, FrameBuffer::sse());
            while let Some(frame) = frames.next().await {
                let frame = frame?;
                let Some(event) = parse_event(&frame) else {
                    continue;
                };

                match serde_json::from_str::<StreamEvent>(&event.data)? {
                    StreamEvent::ContentBlockDelta {
                        delta: Delta::TextDelta { text },
                    } => {
                        yield text;
                    }
                    StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => {}
                    StreamEvent::MessageStop => break,
                    StreamEvent::Error { error } => {
                        tracing::debug!("anthropic stream error: {}", error.error_type);
                        Err::<(), Error>(Error::msg(error.message))?;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ModelMessage;

    fn request() -> ModelRequest {
        ModelRequest {
            system: "You are a study assistant.".to_string(),
            messages: vec![
                ModelMessage {
                    role: Role::User,
                    content: "What is ATP?".to_string(),
                },
                ModelMessage {
                    role: Role::Assistant,
                    content: "An energy carrier.".to_string(),
                },
                ModelMessage {
                    role: Role::User,
                    content: "More detail".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_stream_event_parsing() {
        let delta: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { .. }
            }
        ));

        let ping: StreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, StreamEvent::Other));

        let start: StreamEvent = serde_json::from_str(
            r#"{"type":"message_start","message":{"id":"msg_1","role":"assistant","content":[]}}"#,
        )
        .unwrap();
        assert!(matches!(start, StreamEvent::Other));
    }

    #[tokio::test]
    async fn test_messages_stream() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"model":"claude-3-5-sonnet-latest"}}

event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}

event: ping
data: {"type": "ping"}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ATP stores"}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" energy."}}

event: content_block_stop
data: {"type":"content_block_stop","index":0}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":4}}

event: message_stop
data: {"type":"message_stop"}

"#;

        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"claude-3-5-sonnet-latest","system":"You are a study assistant.","stream":true}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create();

        let client = AnthropicClient::new(&server.url(), "test-key", "claude-3-5-sonnet-latest");
        let deltas: Vec<String> = client
            .messages_stream(request())
            .map(|d| d.unwrap())
            .collect()
            .await;

        mock.assert();
        assert_eq!(deltas, vec!["ATP stores", " energy."]);
    }

    #[tokio::test]
    async fn test_messages_stream_in_band_error() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Partial"}}

event: error
data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}

"#;

        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create();

        let client = AnthropicClient::new(&server.url(), "test-key", "claude-3-5-sonnet-latest");
        let mut stream = client.messages_stream(request());

        assert_eq!(stream.next().await.unwrap().unwrap(), "Partial");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Overloaded");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_messages_stream_rejected_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
            .create();

        let client = AnthropicClient::new(&server.url(), "bad", "claude-3-5-sonnet-latest");
        let err = client
            .messages_stream(request())
            .next()
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid x-api-key");
    }
}
