//! Prompt pipeline: stores → activation → context build.
//!
//! Serializes work per chat so the read-decide-write sequence on activation
//! records never interleaves for the same chat. Different chats run freely
//! in parallel.

use crate::activation::{ActivationEngine, ActivationOptions};
use crate::context::{BuiltContext, ContextBuildOptions, ContextBuilder};
use lorekeeper_core::character::Character;
use lorekeeper_core::error::Result;
use lorekeeper_core::knowledge::{ActivatedEntry, KnowledgeEntry};
use lorekeeper_core::message::{ChatId, Message};
use lorekeeper_core::store::{HistoryStore, KnowledgeStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

// ============================================================================
// Per-Chat Locking
// ============================================================================

/// Per-chat async locks.
#[derive(Default)]
pub struct ChatLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for a chat.
    pub async fn get_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(chat_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop locks nobody holds.
    pub async fn cleanup_unused(&self) {
        let mut locks = self.locks.write().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Where the entries for a build come from.
#[derive(Debug, Clone, Default)]
pub enum EntrySource {
    /// Fetch by character id from the knowledge store.
    #[default]
    Store,
    /// The caller already has them.
    Provided(Vec<KnowledgeEntry>),
}

/// One turn to prepare.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub chat_id: ChatId,
    pub character: Character,
    pub user_message: String,
    pub entries: EntrySource,
}

/// The activated entries and the built context for one turn.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub activated: Vec<ActivatedEntry>,
    pub context: BuiltContext,
}

impl PreparedPrompt {
    /// `[system, user]`, ready for a provider call.
    pub fn messages(&self) -> &[Message] {
        &self.context.messages
    }
}

/// Caller-facing entry point for building prompts.
pub struct PromptPipeline {
    knowledge: Arc<dyn KnowledgeStore>,
    history: Arc<dyn HistoryStore>,
    engine: ActivationEngine,
    builder: ContextBuilder,
    locks: ChatLocks,
}

impl PromptPipeline {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        history: Arc<dyn HistoryStore>,
        engine: ActivationEngine,
        builder: ContextBuilder,
    ) -> Self {
        Self {
            knowledge,
            history,
            engine,
            builder,
            locks: ChatLocks::new(),
        }
    }

    /// Activate entries and build the prompt for one turn.
    ///
    /// Store and template failures abort the build. Activation records are
    /// written only once activation has finished. The chat's lock is
    /// released from the lock map once no other task holds it.
    pub async fn prepare(
        &self,
        request: PromptRequest,
        activation: &ActivationOptions,
        context: &ContextBuildOptions,
    ) -> Result<PreparedPrompt> {
        let lock = self.locks.get_lock(request.chat_id.as_str()).await;
        let result = {
            let _guard = lock.lock().await;
            self.prepare_locked(request, activation, context).await
        };
        drop(lock);
        self.locks.cleanup_unused().await;
        result
    }

    async fn prepare_locked(
        &self,
        request: PromptRequest,
        activation: &ActivationOptions,
        context: &ContextBuildOptions,
    ) -> Result<PreparedPrompt> {
        let chat_id = request.chat_id.as_str();
        let entries = match &request.entries {
            EntrySource::Store => self.knowledge.list_entries(&request.character.id).await?,
            EntrySource::Provided(entries) => entries.clone(),
        };
        let history = self.history.history(chat_id).await?;
        debug!(
            chat = chat_id,
            store = self.knowledge.name(),
            entries = entries.len(),
            history = history.len(),
            "Preparing prompt"
        );

        let activated = self
            .engine
            .activate(chat_id, &entries, &request.user_message, &history, activation)
            .await?;
        let context = self
            .builder
            .build(
                &request.character,
                &history,
                &activated,
                &request.user_message,
                context,
            )
            .await?;

        Ok(PreparedPrompt { activated, context })
    }

    /// Append a finished exchange to the chat history.
    pub async fn record_exchange(&self, chat_id: &ChatId, user: &str, reply: &str) -> Result<()> {
        let lock = self.locks.get_lock(chat_id.as_str()).await;
        let result = {
            let _guard = lock.lock().await;
            self.append_exchange(chat_id.as_str(), user, reply).await
        };
        drop(lock);
        self.locks.cleanup_unused().await;
        result
    }

    async fn append_exchange(&self, chat_id: &str, user: &str, reply: &str) -> Result<()> {
        self.history
            .append_message(chat_id, Message::user(user))
            .await?;
        self.history
            .append_message(chat_id, Message::assistant(reply))
            .await?;
        Ok(())
    }

    pub fn locks(&self) -> &ChatLocks {
        &self.locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateEngine;
    use crate::token::CharCountEstimator;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use lorekeeper_core::error::{Error, StoreError};
    use lorekeeper_core::knowledge::{ActivatedBy, ActivationRecord};
    use lorekeeper_store::InMemoryStore;

    fn pipeline(store: &InMemoryStore) -> PromptPipeline {
        let estimator = Arc::new(CharCountEstimator);
        PromptPipeline::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            ActivationEngine::new(Arc::new(store.clone()), estimator.clone()),
            ContextBuilder::new(estimator, Arc::new(TemplateEngine::new())),
        )
    }

    fn character() -> Character {
        Character {
            id: "mara".into(),
            name: "Mara".into(),
            description: "Cheerful innkeeper".into(),
            ..Character::default()
        }
    }

    fn dragon() -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new("E1", "Dragon", "A red dragon nests in the hills.");
        e.character_id = "mara".into();
        e.insertion_order = 10;
        e.cooldown = 5;
        e.keys = vec!["dragon".into()];
        e
    }

    fn request(entries: EntrySource) -> PromptRequest {
        PromptRequest {
            chat_id: ChatId::from("chat-1"),
            character: character(),
            user_message: "I saw a dragon!".into(),
            entries,
        }
    }

    #[tokio::test]
    async fn store_entries_flow_into_prompt() {
        let store = InMemoryStore::new();
        store.upsert_entry(dragon()).await;
        let now = Utc::now();

        let prepared = pipeline(&store)
            .prepare(
                request(EntrySource::Store),
                &ActivationOptions::default().at(now),
                &ContextBuildOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(prepared.activated.len(), 1);
        assert_eq!(prepared.activated[0].activated_by, ActivatedBy::Keyword);
        assert!(prepared.context.system_message().contains("A red dragon nests"));
        assert_eq!(prepared.messages()[1].content, "I saw a dragon!");
    }

    #[tokio::test]
    async fn provided_entries_bypass_store() {
        let store = InMemoryStore::new();
        let prepared = pipeline(&store)
            .prepare(
                request(EntrySource::Provided(vec![dragon()])),
                &ActivationOptions::default(),
                &ContextBuildOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(prepared.activated.len(), 1);
        assert_eq!(store.records_for_chat("chat-1").await.len(), 1);
    }

    #[tokio::test]
    async fn cooldown_holds_across_turns() {
        let store = InMemoryStore::new();
        store.upsert_entry(dragon()).await;
        let p = pipeline(&store);
        let now = Utc::now();
        let ctx = ContextBuildOptions::default();

        let first = p
            .prepare(request(EntrySource::Store), &ActivationOptions::default().at(now), &ctx)
            .await
            .unwrap();
        assert_eq!(first.activated.len(), 1);
        p.record_exchange(&ChatId::from("chat-1"), "I saw a dragon!", "Where?")
            .await
            .unwrap();

        let later = ActivationOptions::default().at(now + Duration::minutes(1));
        let second = p.prepare(request(EntrySource::Store), &later, &ctx).await.unwrap();
        assert!(second.activated.is_empty());
        assert!(second.context.components.history.contains("Assistant: Where?"));
    }

    #[tokio::test]
    async fn concurrent_turns_do_not_double_record() {
        let store = InMemoryStore::new();
        store.upsert_entry(dragon()).await;
        let p = Arc::new(pipeline(&store));
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                p.prepare(
                    request(EntrySource::Store),
                    &ActivationOptions::default().at(now),
                    &ContextBuildOptions::default(),
                )
                .await
                .unwrap()
                .activated
                .len()
            }));
        }
        let mut fired = 0;
        for h in handles {
            fired += h.await.unwrap();
        }

        assert_eq!(fired, 1);
        assert_eq!(store.records_for_chat("chat-1").await.len(), 1);
    }

    #[tokio::test]
    async fn chat_locks_are_shared_per_chat() {
        let locks = ChatLocks::new();
        let a1 = locks.get_lock("a").await;
        let a2 = locks.get_lock("a").await;
        let b = locks.get_lock("b").await;
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));

        drop((a1, a2));
        locks.cleanup_unused().await;
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn finished_turns_release_their_locks() {
        let store = InMemoryStore::new();
        let p = pipeline(&store);
        p.prepare(
            request(EntrySource::Store),
            &ActivationOptions::default(),
            &ContextBuildOptions::default(),
        )
        .await
        .unwrap();
        p.record_exchange(&ChatId::from("chat-2"), "hi", "hello")
            .await
            .unwrap();
        assert_eq!(p.locks().len().await, 0);
    }

    struct BrokenStore;

    #[async_trait]
    impl KnowledgeStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        async fn list_entries(&self, _: &str) -> std::result::Result<Vec<KnowledgeEntry>, StoreError> {
            Err(StoreError::Storage("disk on fire".into()))
        }
        async fn latest_activation_record(
            &self,
            _: &str,
            _: &str,
        ) -> std::result::Result<Option<ActivationRecord>, StoreError> {
            Ok(None)
        }
        async fn put_activation_records(
            &self,
            _: Vec<ActivationRecord>,
        ) -> std::result::Result<(), StoreError> {
            Ok(())
        }
        async fn count_messages(&self, _: &str) -> std::result::Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn store_failure_aborts_build() {
        let store = InMemoryStore::new();
        let estimator = Arc::new(CharCountEstimator);
        let p = PromptPipeline::new(
            Arc::new(BrokenStore),
            Arc::new(store.clone()),
            ActivationEngine::new(Arc::new(BrokenStore), estimator.clone()),
            ContextBuilder::new(estimator, Arc::new(TemplateEngine::new())),
        );
        let err = p
            .prepare(
                request(EntrySource::Store),
                &ActivationOptions::default(),
                &ContextBuildOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Storage(_))));
    }
}
