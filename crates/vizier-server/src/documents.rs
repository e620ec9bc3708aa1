//! Document persistence: opaque ids, fixed retention.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Length of a document id on the wire
pub const DOCUMENT_ID_LEN: usize = 64;

/// Key-value store for completed generated documents. The store hands back
/// an opaque identifier which the protocol threads to the client as
/// `content_saved`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a document, returning its id
    async fn save(&self, content: String) -> String;

    /// Fetch a document if it exists and has not aged out
    async fn get(&self, id: &str) -> Option<String>;
}

/// Generate an opaque 64-character alphanumeric identifier.
pub fn generate_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}

/// In-memory store with a fixed retention window. Expired entries become
/// unreadable immediately and are pruned on the next write.
pub struct MemoryDocumentStore {
    retention: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryDocumentStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn prune(&self, entries: &mut HashMap<String, (Instant, String)>) {
        let retention = self.retention;
        entries.retain(|_, (saved_at, _)| saved_at.elapsed() < retention);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn save(&self, content: String) -> String {
        let id = generate_id();
        let mut entries = self.entries.lock();
        self.prune(&mut entries);
        entries.insert(id.clone(), (Instant::now(), content));
        tracing::debug!(id = %id, "document saved");
        id
    }

    async fn get(&self, id: &str) -> Option<String> {
        let entries = self.entries.lock();
        let (saved_at, content) = entries.get(id)?;
        if saved_at.elapsed() >= self.retention {
            return None;
        }
        Some(content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), DOCUMENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(), generate_id());
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryDocumentStore::new(Duration::from_secs(60));
        let id = store.save("<html></html>".to_string()).await;
        assert_eq!(id.len(), DOCUMENT_ID_LEN);
        assert_eq!(store.get(&id).await.as_deref(), Some("<html></html>"));
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_retention_window() {
        let store = MemoryDocumentStore::new(Duration::ZERO);
        let id = store.save("<html></html>".to_string()).await;
        assert!(store.get(&id).await.is_none());
    }
}
