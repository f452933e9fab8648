use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::DocumentSource;

/// A document the user has lined up to study.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub url: String,
    pub title: String,
}

impl QueueItem {
    pub fn source(&self) -> DocumentSource {
        DocumentSource::Url(self.url.clone())
    }
}

/// Reads a study queue stored as a JSON array of items.
pub async fn load_queue(path: impl AsRef<Path>) -> Result<Vec<QueueItem>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read queue {}", path.display()))?;
    let items: Vec<QueueItem> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse queue {}", path.display()))?;
    Ok(items)
}

pub fn find<'a>(queue: &'a [QueueItem], id: &str) -> Option<&'a QueueItem> {
    queue.iter().find(|item| item.id == id)
}
