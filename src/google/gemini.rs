//! Streaming client for the Gemini `streamGenerateContent` API.
//!
//! With `alt=sse` every event carries a full `GenerateContentResponse`
//! holding the next slice of the candidate's text. There is no
//! completion marker, the stream simply ends.

use anyhow::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::ai::chat::Role;
use crate::ai::provider::ModelRequest;
use crate::core::sse::{FrameBuffer, parse_event};
use crate::core::upstream::{check_status, frames};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize, Debug)]
struct StreamError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<StreamError>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

pub struct GeminiClient {
    api_hostname: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
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

    fn payload(request: ModelRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: text_content(None, &request.system),
            contents: request
                .messages
                .iter()
                .map(|m| {
                    // Gemini calls the assistant side of the conversation "model"
                    let role = match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    };
                    text_content(Some(role), &m.content)
                })
                .collect(),
        }
    }

    /// Streams the generated content for `request` as text deltas.
    pub fn generate_stream(&self, request: ModelRequest) -> BoxStream<'static, Result<String>> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_hostname, self.model
        );
        let api_key = self.api_key.clone();

        Box::pin(async_stream::try_stream! {
            let response = reqwest::Client::new()
                .post(url)
                .header("x-goog-api-key", &api_key)
                .json(&Self::payload(request))
                .send()
                .await?;
            let response = check_status(response, "google").await?;

            let mut frames = frames(response, FrameBuffer::sse());
            while let Some(frame) = frames.next().await {
                let frame = frame?;
                let Some(event) = parse_event(&frame) else {
                    continue;
                };

                let chunk = serde_json::from_str::<GenerateContentResponse>(&event.data)?;
                if let Some(error) = chunk.error {
                    Err::<(), Error>(Error::msg(error.message))?;
                }
                let texts = chunk
                    .candidates
                    .into_iter()
                    .take(1)
                    .filter_map(|c| c.content)
                    .flat_map(|c| c.parts)
                    .filter_map(|p| p.text);
                for text in texts {
                    yield text;
                }
            }
        })
    }
}
