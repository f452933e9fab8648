//! Router for the chat API

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response, sse::Event, sse::KeepAlive, sse::Sse},
    routing::post,
};
use futures::StreamExt;
use futures::future::ready;
use futures::stream;

use super::public::{self, DONE_MARKER};
use crate::ai::chat::{StreamEvent, build_request, stream_turn};
use crate::ai::{ChatModel, resolve};
use crate::api::public::ApiError;
use crate::api::state::AppState;

type SharedState = Arc<AppState>;

/// Run one chat turn and stream the response
///
/// Validation failures, including bodies that do not parse, answer
/// 400 before any provider is contacted.
/// The status is committed only once the first event is known so a
/// provider that fails straight away (bad key, quota) answers 500
/// with a JSON body instead of a stream holding a single error.
async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<public::ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let model: Arc<dyn ChatModel> = Arc::new(resolve(
        payload.provider.as_deref(),
        payload.api_key.as_deref(),
        &state.config,
    )?);
    let request = build_request(&payload.messages, payload.context.as_deref())?;

    tracing::debug!(
        "Chat turn with {} messages, context {}",
        request.messages.len(),
        if payload.context.is_some() { "attached" } else { "absent" }
    );

    let mut events = stream_turn(model, request, state.config.request_timeout);

    let first = match events.next().await {
        Some(StreamEvent::Error { error_text }) => return Err(ApiError::provider(error_text)),
        Some(event) => event,
        None => return Err(ApiError::provider("Provider returned no response")),
    };

    let sse_stream = stream::once(ready(first))
        .chain(events)
        .map(|event| Event::default().json_data(&event))
        .chain(stream::once(ready(Ok(Event::default().data(DONE_MARKER)))));

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(chat_handler))
}
