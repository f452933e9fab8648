//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::ai::chat::ChatMessage;

/// One chat turn. The full history is resent every time since the
/// server keeps nothing between requests.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Marks the end of the event stream after the terminal event.
pub const DONE_MARKER: &str = "[DONE]";
