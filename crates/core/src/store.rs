//! Store traits: where knowledge entries, activation state and history live.
//!
//! Implementations: SQLite and in-memory (for testing), in `lorekeeper-store`.
//! Store failures are fatal to a build and surface to the caller.

use crate::error::StoreError;
use crate::knowledge::{ActivationRecord, KnowledgeEntry};
use crate::message::Message;
use async_trait::async_trait;

/// Knowledge entries plus the activation records that gate them.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// All entries belonging to a character, enabled or not.
    async fn list_entries(&self, character_id: &str) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// The most recent activation record for (entry, chat), if any.
    async fn latest_activation_record(
        &self,
        entry_id: &str,
        chat_id: &str,
    ) -> Result<Option<ActivationRecord>, StoreError>;

    /// Persist a batch of records written by one build.
    async fn put_activation_records(&self, records: Vec<ActivationRecord>)
    -> Result<(), StoreError>;

    /// Number of messages stored for a chat.
    async fn count_messages(&self, chat_id: &str) -> Result<usize, StoreError>;
}

/// Ordered chat history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Messages for a chat, oldest first.
    async fn history(&self, chat_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Append a message to a chat.
    async fn append_message(&self, chat_id: &str, message: Message) -> Result<(), StoreError>;
}
