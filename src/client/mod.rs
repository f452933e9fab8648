//! The interactive side of a chat: session state, settings, the
//! transport to the server and the study queue.

pub mod queue;
pub mod session;
pub mod settings;
pub mod transport;

pub use queue::{QueueItem, load_queue};
pub use session::{
    AttachmentRequest, AttachmentResult, ChatSession, DocumentTicket, DocumentUpdate,
    SessionStatus, SubmitError, TurnOutcome, UpdateReceiver, UpdateSender, extract_attachments,
    spawn_active_extraction, spawn_attachment_extraction,
};
pub use settings::{FileSettingsStore, ProviderConfig, SettingsStore};
pub use transport::{ChatTransport, HttpTransport, TransportError};
