//! Conversational context built from the viewed document and any
//! attached documents.

use serde::{Deserialize, Serialize};

/// Text extracted from the document currently open for viewing.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveContext {
    pub title: String,
    pub extracted_text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentOrigin {
    Upload,
    QueueSelection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub extracted_text: String,
    pub origin: AttachmentOrigin,
}

fn section(kind: &str, name: &str, text: &str) -> String {
    format!("--- {} Document: {} ---\n{}", kind, name, text)
}

/// Merges the active document and attachments into one context
/// string. The active document always comes first, attachments follow
/// in list order. Returns `None` when there is nothing to send so the
/// caller can omit the field entirely.
pub fn aggregate(active: Option<&ActiveContext>, attachments: &[Attachment]) -> Option<String> {
    let sections: Vec<String> = active
        .map(|a| section("Active", &a.title, &a.extracted_text))
        .into_iter()
        .chain(
            attachments
                .iter()
                .map(|a| section("Attached", &a.name, &a.extracted_text)),
        )
        .collect();

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}
