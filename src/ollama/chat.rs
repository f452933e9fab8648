use anyhow::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::ai::chat::Role;
use crate::ai::provider::ModelRequest;
use crate::core::sse::FrameBuffer;
use crate::core::upstream::{check_status, frames};

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

// Ollama streams newline delimited JSON objects, one per token batch,
// with `done: true` on the last one
#[derive(Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// A client for a local Ollama compatible server. Needs no API key.
pub struct OllamaClient {
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn chat_stream(&self, request: ModelRequest) -> BoxStream<'static, Result<String>> {
        let url = format!("{}/chat", self.base_url);
        let model = self.model.clone();

        Box::pin(async_stream::try_stream! {
            let mut messages = vec![OllamaMessage {
                role: "system",
                content: &request.system,
            }];
            messages.extend(request.messages.iter().map(|m| OllamaMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            }));
            let payload = OllamaChatRequest {
                model: &model,
                messages,
                stream: true,
            };

            let response = reqwest::Client::new()
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    Error::msg(format!(
                        "Could not reach Ollama at {}. Make sure it is running with `ollama serve`: {}",
                        url, e
                    ))
                })?;
            let response = check_status(response, "ollama").await?;

            let mut lines = frames(response, FrameBuffer::lines());
            while let Some(line) = lines.next().await {
                let chunk = serde_json::from_str::<OllamaChatChunk>(&line?)?;
                if let Some(error) = chunk.error {
                    Err::<(), Error>(Error::msg(error))?;
                }
                if let Some(message) = chunk.message {
                    yield message.content;
                }
                if chunk.done {
                    break;
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
            messages: vec![ModelMessage {
                role: Role::User,
                content: "Hi".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_chat_stream() {
        let mut server = mockito::Server::new_async().await;

        let ndjson = concat!(
            r#"{"model":"llama3.1","created_at":"2024-07-23T00:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#,
            "\n",
            r#"{"model":"llama3.1","created_at":"2024-07-23T00:00:00Z","message":{"role":"assistant","content":"lo"},"done":false}"#,
            "\n",
            r#"{"model":"llama3.1","created_at":"2024-07-23T00:00:01Z","message":{"role":"assistant","content":""},"done":true,"total_duration":1000}"#,
            "\n",
        );

        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"llama3.1","stream":true,"messages":[{"role":"system","content":"You are a study assistant."},{"role":"user","content":"Hi"}]}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(ndjson)
            .create();

        let client = OllamaClient::new(&format!("{}/api/", server.url()), "llama3.1");
        let deltas: Vec<String> = client
            .chat_stream(request())
            .map(|d| d.unwrap())
            .collect()
            .await;

        mock.assert();
        assert_eq!(deltas.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_chat_stream_model_missing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model \"llama3.1\" not found, try pulling it first"}"#)
            .create();

        let client = OllamaClient::new(&format!("{}/api", server.url()), "llama3.1");
        let err = client
            .chat_stream(request())
            .next()
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "model \"llama3.1\" not found, try pulling it first"
        );
    }

    #[tokio::test]
    async fn test_chat_stream_unreachable() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = OllamaClient::new("http://127.0.0.1:9/api", "llama3.1");
        let err = client
            .chat_stream(request())
            .next()
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().starts_with("Could not reach Ollama"));
    }
}
