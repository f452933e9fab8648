//! State for one open chat: the transcript, the documents it is
//! grounded in, and where the current turn stands.
//!
//! Status moves `Idle -> Submitted -> Streaming -> Idle` on success.
//! Any failure parks the session in `Error` until the user
//! acknowledges it. Document handling never looks at the status, so
//! attachments and the viewed document can change mid-turn: extraction
//! runs on spawned tasks and reports back over a channel that the turn
//! driver keeps draining while the reply streams.

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::settings::ProviderConfig;
use super::transport::{ChatTransport, TransportError};
use crate::ai::Provider;
use crate::ai::chat::{ChatMessage, Role, StreamEvent, Transcript};
use crate::api::public::chat::ChatRequest;
use crate::client::queue::QueueItem;
use crate::context::{ActiveContext, Attachment, AttachmentOrigin, aggregate};
use crate::extract::{DocumentSource, ExtractionError, extract, extract_all};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Submitted,
    Streaming,
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A response is still in progress ({0:?})")]
    Busy(SessionStatus),
    #[error("Message is empty")]
    EmptyMessage,
    /// The user needs to visit settings before chatting
    #[error("No API key configured for {0}")]
    MissingCredential(Provider),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(String),
    /// The server refused the request as invalid, which means the
    /// stored provider settings need fixing
    NeedsSettings(String),
}

/// Identifies one extraction of the viewed document. Results carrying
/// a stale generation are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentTicket {
    generation: u64,
    title: String,
}

impl DocumentTicket {
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// A document the user asked to attach.
#[derive(Clone, Debug)]
pub struct AttachmentRequest {
    pub name: String,
    pub origin: AttachmentOrigin,
    pub source: DocumentSource,
}

impl AttachmentRequest {
    pub fn upload(source: DocumentSource) -> Self {
        Self {
            name: source.name().to_string(),
            origin: AttachmentOrigin::Upload,
            source,
        }
    }

    pub fn from_queue(item: &QueueItem) -> Self {
        Self {
            name: item.title.clone(),
            origin: AttachmentOrigin::QueueSelection,
            source: item.source(),
        }
    }
}

#[derive(Debug)]
pub struct AttachmentResult {
    pub name: String,
    pub origin: AttachmentOrigin,
    pub result: Result<String, ExtractionError>,
}

/// Extracts a batch of attachments concurrently. Kept separate from
/// the session so the work can run while the session is in use.
pub async fn extract_attachments(requests: Vec<AttachmentRequest>) -> Vec<AttachmentResult> {
    let sources: Vec<DocumentSource> = requests.iter().map(|r| r.source.clone()).collect();
    let results = extract_all(&sources).await;
    requests
        .into_iter()
        .zip(results)
        .map(|(req, result)| AttachmentResult {
            name: req.name,
            origin: req.origin,
            result,
        })
        .collect()
}

/// A finished extraction on its way back to the session.
#[derive(Debug)]
pub enum DocumentUpdate {
    Active {
        ticket: DocumentTicket,
        result: Result<String, ExtractionError>,
    },
    Attachments(Vec<AttachmentResult>),
}

pub type UpdateSender = mpsc::UnboundedSender<DocumentUpdate>;
pub type UpdateReceiver = mpsc::UnboundedReceiver<DocumentUpdate>;

/// Extracts the viewed document in the background and sends the result
/// to `updates`.
pub fn spawn_active_extraction(
    ticket: DocumentTicket,
    source: DocumentSource,
    updates: UpdateSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = extract(&source).await;
        if updates.send(DocumentUpdate::Active { ticket, result }).is_err() {
            tracing::debug!("Session went away before {} was extracted", source.name());
        }
    })
}

/// Extracts a batch of attachments in the background and sends the
/// results to `updates` as one update.
pub fn spawn_attachment_extraction(
    requests: Vec<AttachmentRequest>,
    updates: UpdateSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let results = extract_attachments(requests).await;
        if updates.send(DocumentUpdate::Attachments(results)).is_err() {
            tracing::debug!("Session went away before attachments were extracted");
        }
    })
}

/// Resolves to the next update, or never once there is no channel.
async fn next_update(updates: &mut Option<&mut UpdateReceiver>) -> Option<DocumentUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Default)]
struct ViewedDocument {
    generation: u64,
    title: Option<String>,
    context: Option<ActiveContext>,
}

#[derive(Debug)]
pub struct ChatSession {
    status: SessionStatus,
    transcript: Transcript,
    attachments: Vec<Attachment>,
    viewed: ViewedDocument,
    last_error: Option<String>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            transcript: Transcript::new(),
            attachments: Vec::new(),
            viewed: ViewedDocument::default(),
            last_error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn active_context(&self) -> Option<&ActiveContext> {
        self.viewed.context.as_ref()
    }

    /// The error waiting to be acknowledged, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The context string the next submission will carry.
    pub fn context(&self) -> Option<String> {
        aggregate(self.viewed.context.as_ref(), &self.attachments)
    }

    // Active document

    /// Switches the viewed document and hands back a ticket for the
    /// extraction that should follow. Viewing a different document
    /// drops the previous context right away, viewing the same one
    /// keeps it until the new text arrives.
    pub fn view_document(&mut self, title: &str) -> DocumentTicket {
        if self.viewed.title.as_deref() != Some(title) {
            self.viewed.context = None;
            self.viewed.title = Some(title.to_string());
        }
        self.viewed.generation += 1;
        DocumentTicket {
            generation: self.viewed.generation,
            title: title.to_string(),
        }
    }

    /// Applies the outcome of an active document extraction. Returns a
    /// warning to show the user when it failed.
    pub fn apply_active_context(
        &mut self,
        ticket: DocumentTicket,
        result: Result<String, ExtractionError>,
    ) -> Option<String> {
        if ticket.generation != self.viewed.generation {
            tracing::debug!("Discarding stale extraction of {}", ticket.title);
            return None;
        }

        match result {
            Ok(extracted_text) => {
                self.viewed.context = Some(ActiveContext {
                    title: ticket.title,
                    extracted_text,
                });
                None
            }
            Err(e) => {
                tracing::warn!("Extraction of {} failed: {}", ticket.title, e);
                Some(format!("Could not load {}: {}", ticket.title, e))
            }
        }
    }

    // Attachments

    /// Appends the successful extractions in batch order. Failures are
    /// left out and reported as one warning each.
    pub fn apply_attachments(&mut self, results: Vec<AttachmentResult>) -> Vec<String> {
        let mut warnings = Vec::new();
        for AttachmentResult {
            name,
            origin,
            result,
        } in results
        {
            match result {
                Ok(extracted_text) => self.attachments.push(Attachment {
                    name,
                    extracted_text,
                    origin,
                }),
                Err(e) => {
                    tracing::warn!("Extraction of attachment {} failed: {}", name, e);
                    warnings.push(format!("Could not attach {}: {}", name, e));
                }
            }
        }
        warnings
    }

    /// Applies a finished background extraction and returns the
    /// warnings it produced.
    pub fn apply_update(&mut self, update: DocumentUpdate) -> Vec<String> {
        match update {
            DocumentUpdate::Active { ticket, result } => {
                self.apply_active_context(ticket, result).into_iter().collect()
            }
            DocumentUpdate::Attachments(results) => self.apply_attachments(results),
        }
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<Attachment> {
        if index < self.attachments.len() {
            Some(self.attachments.remove(index))
        } else {
            None
        }
    }

    // Turn lifecycle

    /// Records the user's message and builds the request to send.
    /// Nothing changes when the submission is refused.
    pub fn begin_submit(
        &mut self,
        text: &str,
        settings: &ProviderConfig,
    ) -> Result<ChatRequest, SubmitError> {
        if self.status != SessionStatus::Idle {
            return Err(SubmitError::Busy(self.status));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        if !settings.is_usable() {
            return Err(SubmitError::MissingCredential(settings.provider));
        }

        self.transcript.push(ChatMessage::new(Role::User, text));
        self.status = SessionStatus::Submitted;

        Ok(ChatRequest {
            messages: self.transcript.messages(),
            provider: Some(settings.provider.as_str().to_string()),
            api_key: settings.credential().map(str::to_string),
            context: self.context(),
        })
    }

    /// Appends a streamed delta to the assistant message of the
    /// current turn, opening it on the first delta.
    pub fn push_delta(&mut self, delta: &str) {
        match self.status {
            SessionStatus::Submitted => {
                self.transcript.push(ChatMessage::new(Role::Assistant, delta));
                self.status = SessionStatus::Streaming;
            }
            SessionStatus::Streaming => {
                if let Some(msg) = self.transcript.last_mut() {
                    msg.push_text(delta);
                }
            }
            SessionStatus::Idle | SessionStatus::Error => {
                tracing::debug!("Ignoring delta outside of a turn");
            }
        }
    }

    pub fn complete(&mut self) {
        if matches!(
            self.status,
            SessionStatus::Submitted | SessionStatus::Streaming
        ) {
            self.status = SessionStatus::Idle;
        }
    }

    /// Ends the turn with an error. Whatever was already streamed
    /// stays in the transcript.
    pub fn fail(&mut self, message: &str) {
        if matches!(
            self.status,
            SessionStatus::Submitted | SessionStatus::Streaming
        ) {
            self.status = SessionStatus::Error;
            self.last_error = Some(message.to_string());
        }
    }

    /// Clears a failed turn so input is accepted again.
    pub fn acknowledge_error(&mut self) -> Option<String> {
        if self.status == SessionStatus::Error {
            self.status = SessionStatus::Idle;
        }
        self.last_error.take()
    }

    /// Drives a whole turn: submit, stream deltas into the transcript
    /// and settle on a final status. `on_delta` sees each delta as it
    /// is applied.
    pub async fn run_turn<T, F>(
        &mut self,
        transport: &T,
        text: &str,
        settings: &ProviderConfig,
        on_delta: F,
    ) -> Result<TurnOutcome, SubmitError>
    where
        T: ChatTransport + ?Sized,
        F: FnMut(&str),
    {
        self.drive_turn(transport, text, settings, None, on_delta, |_| {}).await
    }

    /// Like `run_turn`, but also applies extractions that finish while
    /// the reply is streaming. Updates win over stream events when both
    /// are ready. Warnings from those updates go to `on_warning`.
    pub async fn run_turn_with_updates<T, F, W>(
        &mut self,
        transport: &T,
        text: &str,
        settings: &ProviderConfig,
        updates: &mut UpdateReceiver,
        on_delta: F,
        on_warning: W,
    ) -> Result<TurnOutcome, SubmitError>
    where
        T: ChatTransport + ?Sized,
        F: FnMut(&str),
        W: FnMut(&str),
    {
        self.drive_turn(transport, text, settings, Some(updates), on_delta, on_warning).await
    }

    async fn drive_turn<T, F, W>(
        &mut self,
        transport: &T,
        text: &str,
        settings: &ProviderConfig,
        mut updates: Option<&mut UpdateReceiver>,
        mut on_delta: F,
        mut on_warning: W,
    ) -> Result<TurnOutcome, SubmitError>
    where
        T: ChatTransport + ?Sized,
        F: FnMut(&str),
        W: FnMut(&str),
    {
        let request = self.begin_submit(text, settings)?;

        let mut events = match transport.send(request).await {
            Ok(events) => events,
            Err(TransportError::InvalidSettings(message)) => {
                self.fail(&message);
                return Ok(TurnOutcome::NeedsSettings(message));
            }
            Err(e) => return Ok(self.settle_failure(e.to_string())),
        };

        loop {
            tokio::select! {
                biased;
                update = next_update(&mut updates) => match update {
                    Some(update) => {
                        for warning in self.apply_update(update) {
                            on_warning(&warning);
                        }
                    }
                    // Every sender is gone, keep streaming without it
                    None => updates = None,
                },
                event = events.next() => match event {
                    Some(Ok(StreamEvent::TextDelta { delta })) => {
                        self.push_delta(&delta);
                        on_delta(&delta);
                    }
                    Some(Ok(StreamEvent::Finish)) => {
                        self.complete();
                        return Ok(TurnOutcome::Completed);
                    }
                    Some(Ok(StreamEvent::Error { error_text })) => {
                        return Ok(self.settle_failure(error_text));
                    }
                    Some(Err(e)) => return Ok(self.settle_failure(e.to_string())),
                    None => {
                        return Ok(self.settle_failure(String::from("Stream ended unexpectedly")));
                    }
                },
            }
        }
    }

    fn settle_failure(&mut self, message: String) -> TurnOutcome {
        self.fail(&message);
        TurnOutcome::Failed(message)
    }
}
