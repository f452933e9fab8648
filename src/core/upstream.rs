//! Helpers shared by the vendor clients for talking to upstream APIs.

use anyhow::{Result, anyhow};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;

use super::sse::FrameBuffer;

/// Pulls the human readable message out of an upstream error body.
/// OpenAI, Anthropic and Google nest it under `error.message`, Ollama
/// sends a bare `error` string.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Passes successful responses through and turns anything else into
/// an error carrying the upstream message.
pub async fn check_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| body.trim().to_string());
    tracing::debug!("{} responded with {}: {}", provider, status, message);

    if message.is_empty() {
        Err(anyhow!("{} request failed with status {}", provider, status))
    } else {
        Err(anyhow!(message))
    }
}

/// Cuts a streamed response body into frames as they arrive. The
/// trailing frame, if the body did not end with a delimiter, is
/// yielded last.
pub fn frames(
    response: reqwest::Response,
    mut buffer: FrameBuffer,
) -> BoxStream<'static, Result<String>> {
    Box::pin(async_stream::try_stream! {
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            buffer.push(&chunk?);
            while let Some(frame) = buffer.next_frame()? {
                yield frame;
            }
        }
        if let Some(frame) = buffer.finish()? {
            yield frame;
        }
    })
}
