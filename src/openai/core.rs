use anyhow::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::ai::chat::Role as ChatRole;
use crate::ai::provider::ModelRequest;
use crate::core::sse::{FrameBuffer, parse_event};
use crate::core::upstream::{check_status, frames};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

impl From<ChatRole> for Role {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Assistant,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Message {
    role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

/// A client for OpenAI's chat completions API.
pub struct OpenAiClient {
    api_hostname: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
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

    fn messages(request: ModelRequest) -> Vec<Message> {
        let mut messages = vec![Message::new(Role::System, &request.system)];
        messages.extend(
            request
                .messages
                .into_iter()
                .map(|m| Message::new(m.role.into(), &m.content)),
        );
        messages
    }

    /// Streams the completion for `request` as text deltas.
    pub fn completion_stream(&self, request: ModelRequest) -> BoxStream<'static, Result<String>> {
        let url = format!("{}/v1/chat/completions", self.api_hostname);
        let api_key = self.api_key.clone();
        let model = self.model.clone();

        Box::pin(async_stream::try_stream! {
            let payload = CompletionRequest {
                model: &model,
                messages: Self::messages(request),
                stream: true,
            };
            let response = reqwest::Client::new()
                .post(url)
                .bearer_auth(&api_key)
                .header("Content-Type", "application/json")
                .json(&payload)
                .send()
                .await?;
            let response = check_status(response, "openai").await?;

            let mut frames = frames(response, FrameBuffer::sse());
            while let Some(frame) = frames.next().await {
                let frame = frame?;
                let Some(event) = parse_event(&frame) else {
                    continue;
                };

                // Handle the end of the stream
                if event.data == "[DONE]" {
                    break;
                }

                let chunk = serde_json::from_str::<CompletionChunk>(&event.data).inspect_err(|e| {
                    tracing::error!("Parsing completion chunk failed for {}\nError:{}", event.data, e)
                })?;
                if let Some(error) = chunk.error {
                    Err::<(), Error>(Error::msg(error.message))?;
                }
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        yield content;
                    }
                }
            }
        })
    }
}
