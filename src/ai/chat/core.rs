use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::time::{Instant, timeout_at};

use super::models::{ChatMessage, StreamEvent};
use crate::ai::prompt::system_prompt;
use crate::ai::provider::{ChatModel, ModelMessage, ModelRequest};

/// Converts the caller's history into model input. Non-text parts are
/// ignored and messages left without any text are dropped since
/// several providers reject empty content.
pub fn to_model_messages(history: &[ChatMessage]) -> Vec<ModelMessage> {
    history
        .iter()
        .filter_map(|m| {
            let content = m.text();
            if content.trim().is_empty() {
                None
            } else {
                Some(ModelMessage {
                    role: m.role,
                    content,
                })
            }
        })
        .collect()
}

pub fn build_request(history: &[ChatMessage], context: Option<&str>) -> Result<ModelRequest> {
    Ok(ModelRequest {
        system: system_prompt(context)?,
        messages: to_model_messages(history),
    })
}

/// Runs one stateless chat turn.
///
/// Deltas are forwarded as soon as the provider emits them. The whole
/// turn, including the wait for the first byte, is bounded by
/// `timeout`. Any failure ends the stream with a single
/// `StreamEvent::Error` carrying the upstream message. Dropping the
/// returned stream drops the upstream request with it.
pub fn stream_turn(
    model: Arc<dyn ChatModel>,
    request: ModelRequest,
    timeout: Duration,
) -> BoxStream<'static, StreamEvent> {
    Box::pin(async_stream::stream! {
        let deadline = Instant::now() + timeout;
        let provider = model.provider();
        let mut deltas = model.stream(request);

        loop {
            match timeout_at(deadline, deltas.next()).await {
                Ok(Some(Ok(delta))) => {
                    if !delta.is_empty() {
                        yield StreamEvent::TextDelta { delta };
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Chat stream from {} failed: {}", provider, e);
                    yield StreamEvent::Error { error_text: e.to_string() };
                    break;
                }
                Ok(None) => {
                    yield StreamEvent::Finish;
                    break;
                }
                Err(_) => {
                    tracing::error!("Chat stream from {} timed out", provider);
                    yield StreamEvent::Error {
                        error_text: format!("Request timed out after {}s", timeout.as_secs()),
                    };
                    break;
                }
            }
        }
    })
}
