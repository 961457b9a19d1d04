//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use lorekeeper_core::error::StoreError;
use lorekeeper_core::knowledge::{ActivationRecord, KnowledgeEntry};
use lorekeeper_core::message::Message;
use lorekeeper_core::store::{HistoryStore, KnowledgeStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps entries, activation records and chat history in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<Vec<KnowledgeEntry>>>,
    records: Arc<RwLock<Vec<ActivationRecord>>>,
    messages: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry by id. New entries keep insertion order.
    pub async fn upsert_entry(&self, entry: KnowledgeEntry) {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Every record written for a chat, oldest first.
    pub async fn records_for_chat(&self, chat_id: &str) -> Vec<ActivationRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.chat_id == chat_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn list_entries(&self, character_id: &str) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.character_id == character_id)
            .cloned()
            .collect())
    }

    async fn latest_activation_record(
        &self,
        entry_id: &str,
        chat_id: &str,
    ) -> Result<Option<ActivationRecord>, StoreError> {
        let records = self.records.read().await;
        // Later writes win ties on activated_at.
        let latest = records
            .iter()
            .filter(|r| r.entry_id == entry_id && r.chat_id == chat_id)
            .fold(None::<&ActivationRecord>, |best, r| match best {
                Some(b) if b.activated_at > r.activated_at => Some(b),
                _ => Some(r),
            });
        Ok(latest.cloned())
    }

    async fn put_activation_records(
        &self,
        records: Vec<ActivationRecord>,
    ) -> Result<(), StoreError> {
        self.records.write().await.extend(records);
        Ok(())
    }

    async fn count_messages(&self, chat_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .get(chat_id)
            .map_or(0, Vec::len))
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn history(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_message(&self, chat_id: &str, message: Message) -> Result<(), StoreError> {
        self.messages
            .write()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }
}
