//! Lorebook activation: gate, trigger, cascade, sort and rate limit.
//!
//! # Algorithm
//!
//! 1. Count prior messages once and index entries by id.
//! 2. Walk entries in input order. Each unvisited, enabled entry passes the
//!    timing gate ([`gate`](super::gate::gate)) and, when idle, trigger
//!    evaluation. Hits are marked visited and may cascade through an explicit
//!    `(entry_id, depth)` work stack.
//! 3. Stable sort by insertion order.
//! 4. Greedy prefix cutoff on entry count and total rendered tokens.
//! 5. Persist one activation record per surviving non-sticky hit, as a batch.
//!
//! Nothing is written until step 5, so a build dropped mid-way leaves the
//! activation state untouched.

use super::gate::{GateState, gate};
use super::matcher;
use crate::token;
use chrono::{DateTime, Utc};
use lorekeeper_config::ActivationConfig;
use lorekeeper_core::capability::{TokenEstimator, VectorSimilarity};
use lorekeeper_core::error::{Result, StoreError};
use lorekeeper_core::knowledge::{
    ActivatedBy, ActivatedEntry, ActivationRecord, ActivationType, KnowledgeEntry,
};
use lorekeeper_core::message::Message;
use lorekeeper_core::store::KnowledgeStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Options ───────────────────────────────────────────────────────────────

/// Limits and switches for one activation pass.
#[derive(Debug, Clone)]
pub struct ActivationOptions {
    pub max_activated_entries: usize,
    pub max_total_tokens: usize,
    pub max_recursion_depth: u32,
    pub use_regex: bool,
    pub vector_threshold: f32,
    /// Model id handed to the token estimator.
    pub model: String,
    /// Clock for the timing gate. `None` reads the system clock.
    pub now: Option<DateTime<Utc>>,
}

impl ActivationOptions {
    pub fn from_config(config: &ActivationConfig, model: impl Into<String>) -> Self {
        Self {
            max_activated_entries: config.max_activated_entries,
            max_total_tokens: config.max_total_tokens,
            max_recursion_depth: config.max_recursion_depth,
            use_regex: config.use_regex,
            vector_threshold: config.vector_threshold,
            model: model.into(),
            now: None,
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

impl Default for ActivationOptions {
    fn default() -> Self {
        Self::from_config(&ActivationConfig::default(), "gpt-4o")
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// A hit before sorting and rate limiting.
struct Hit<'a> {
    entry: &'a KnowledgeEntry,
    activated_by: ActivatedBy,
    cascade_level: u32,
    /// Sticky force-activations do not open a new window.
    writes_record: bool,
}

/// Per-build state threaded through evaluation.
struct Pass<'a> {
    chat_id: &'a str,
    now: DateTime<Utc>,
    message_count: usize,
    visited: HashSet<&'a str>,
    records: HashMap<&'a str, Option<ActivationRecord>>,
    hits: Vec<Hit<'a>>,
}

/// Decides which knowledge entries fire for a turn.
pub struct ActivationEngine {
    store: Arc<dyn KnowledgeStore>,
    estimator: Arc<dyn TokenEstimator>,
    similarity: Option<Arc<dyn VectorSimilarity>>,
}

impl ActivationEngine {
    pub fn new(store: Arc<dyn KnowledgeStore>, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            store,
            estimator,
            similarity: None,
        }
    }

    /// Enable vector-type entries.
    pub fn with_similarity(mut self, similarity: Arc<dyn VectorSimilarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Run one activation pass.
    ///
    /// Output is sorted by insertion order, contains each entry at most once
    /// and respects both rate limits. Store failures are returned as errors.
    pub async fn activate(
        &self,
        chat_id: &str,
        entries: &[KnowledgeEntry],
        current_message: &str,
        history: &[Message],
        options: &ActivationOptions,
    ) -> Result<Vec<ActivatedEntry>> {
        let mut pass = Pass {
            chat_id,
            now: options.now.unwrap_or_else(Utc::now),
            message_count: self.store.count_messages(chat_id).await?,
            visited: HashSet::new(),
            records: HashMap::new(),
            hits: Vec::new(),
        };

        let mut by_id: HashMap<&str, &KnowledgeEntry> = HashMap::with_capacity(entries.len());
        for entry in entries {
            by_id.entry(entry.id.as_str()).or_insert(entry);
        }

        let mut haystacks: HashMap<usize, String> = HashMap::new();
        let mut message_embedding: Option<Option<Vec<f32>>> = None;

        for entry in entries {
            if pass.visited.contains(entry.id.as_str()) || !Self::is_usable(entry) {
                continue;
            }

            match self.gate_for(&mut pass, entry).await? {
                GateState::Sticky { until } => {
                    debug!(entry = %entry.id, %until, "Sticky window open, force-activating");
                    pass.visited.insert(entry.id.as_str());
                    pass.hits.push(Hit {
                        entry,
                        activated_by: ActivatedBy::Always,
                        cascade_level: 0,
                        writes_record: false,
                    });
                    continue;
                }
                GateState::Cooldown { until } => {
                    debug!(entry = %entry.id, %until, "Cooling down, skipped");
                    continue;
                }
                GateState::Delayed { remaining } => {
                    debug!(entry = %entry.id, remaining, "Delayed, skipped");
                    continue;
                }
                GateState::Idle => {}
            }

            let haystack = haystacks
                .entry(entry.min_activations)
                .or_insert_with(|| {
                    matcher::scan_text(current_message, history, entry.min_activations)
                })
                .as_str();
            let Some(activated_by) = self
                .trigger(entry, haystack, current_message, &mut message_embedding, options)
                .await
            else {
                continue;
            };

            pass.visited.insert(entry.id.as_str());
            pass.hits.push(Hit {
                entry,
                activated_by,
                cascade_level: 0,
                writes_record: true,
            });
            self.cascade(&mut pass, &by_id, entry, options).await?;
        }

        let Pass {
            hits,
            now,
            message_count,
            ..
        } = pass;
        let (activated, records) =
            self.rate_limit(hits, chat_id, now, message_count, options);

        if !records.is_empty() {
            self.store.put_activation_records(records).await?;
        }
        info!(
            chat = chat_id,
            activated = activated.len(),
            "Activation pass complete"
        );
        Ok(activated)
    }

    fn is_usable(entry: &KnowledgeEntry) -> bool {
        if !entry.enabled {
            return false;
        }
        if let Some(err) = &entry.load_error {
            warn!(entry = %entry.id, "Entry failed to load, treated as non-triggering: {err}");
            return false;
        }
        true
    }

    async fn gate_for<'a>(
        &self,
        pass: &mut Pass<'a>,
        entry: &'a KnowledgeEntry,
    ) -> std::result::Result<GateState, StoreError> {
        let record = match pass.records.get(entry.id.as_str()) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self
                    .store
                    .latest_activation_record(&entry.id, pass.chat_id)
                    .await?;
                pass.records.insert(entry.id.as_str(), fetched.clone());
                fetched
            }
        };
        Ok(gate(record.as_ref(), pass.now, entry.delay, pass.message_count))
    }

    /// First matching trigger for an idle entry.
    async fn trigger(
        &self,
        entry: &KnowledgeEntry,
        haystack: &str,
        current_message: &str,
        message_embedding: &mut Option<Option<Vec<f32>>>,
        options: &ActivationOptions,
    ) -> Option<ActivatedBy> {
        match entry.activation_type {
            ActivationType::Always => Some(ActivatedBy::Always),
            ActivationType::Keyword => {
                matcher::keywords_match(entry, haystack).then_some(ActivatedBy::Keyword)
            }
            ActivationType::Regex => (options.use_regex
                && matcher::regex_matches(entry, current_message))
            .then_some(ActivatedBy::Regex),
            ActivationType::Vector => {
                let similarity = self.similarity.as_ref()?;
                let target = entry.embedding.as_deref()?;
                if message_embedding.is_none() {
                    let embedded = match similarity.embed(current_message).await {
                        Ok(v) => Some(v),
                        Err(e) => {
                            warn!("Embedding the current message failed: {e}");
                            None
                        }
                    };
                    *message_embedding = Some(embedded);
                }
                let query = message_embedding.as_ref()?.as_deref()?;
                let score = similarity.cosine_similarity(query, target);
                debug!(entry = %entry.id, score, "Vector similarity");
                (score >= options.vector_threshold).then_some(ActivatedBy::Vector)
            }
        }
    }

    /// Walk cascade targets of `root` depth-first.
    async fn cascade<'a>(
        &self,
        pass: &mut Pass<'a>,
        by_id: &HashMap<&'a str, &'a KnowledgeEntry>,
        root: &'a KnowledgeEntry,
        options: &ActivationOptions,
    ) -> std::result::Result<(), StoreError> {
        if !root.recursive || root.cascade_trigger.is_empty() || options.max_recursion_depth == 0 {
            return Ok(());
        }

        let mut stack: Vec<(&str, u32)> = Vec::new();
        push_targets(&mut stack, root, 1);

        while let Some((id, depth)) = stack.pop() {
            let Some(&target) = by_id.get(id) else {
                debug!(source = %root.id, cascade_to = id, "Unknown cascade target, skipped");
                continue;
            };
            if pass.visited.contains(target.id.as_str()) || !Self::is_usable(target) {
                continue;
            }
            if target.recursive_level != 0 && target.recursive_level != depth {
                continue;
            }

            let hit = match self.gate_for(pass, target).await? {
                GateState::Cooldown { .. } | GateState::Delayed { .. } => continue,
                GateState::Sticky { .. } => Hit {
                    entry: target,
                    activated_by: ActivatedBy::Always,
                    cascade_level: depth,
                    writes_record: false,
                },
                GateState::Idle => Hit {
                    entry: target,
                    activated_by: ActivatedBy::Recursive,
                    cascade_level: depth,
                    writes_record: true,
                },
            };

            debug!(source = %root.id, cascade_to = %target.id, depth, "Cascade activation");
            pass.visited.insert(target.id.as_str());
            let continues = hit.writes_record;
            pass.hits.push(hit);
            if continues && target.recursive && depth < options.max_recursion_depth {
                push_targets(&mut stack, target, depth + 1);
            }
        }
        Ok(())
    }

    /// Sort, render and cut the hit list; stage records for survivors.
    fn rate_limit(
        &self,
        mut hits: Vec<Hit<'_>>,
        chat_id: &str,
        now: DateTime<Utc>,
        message_count: usize,
        options: &ActivationOptions,
    ) -> (Vec<ActivatedEntry>, Vec<ActivationRecord>) {
        hits.sort_by_key(|hit| hit.entry.insertion_order);

        let total_hits = hits.len();
        let mut activated = Vec::new();
        let mut records = Vec::new();
        let mut total_tokens = 0usize;

        for hit in hits {
            if activated.len() >= options.max_activated_entries {
                break;
            }
            let mut rendered = hit.entry.insertion_text();
            if let Some(cap) = hit.entry.token_budget {
                rendered =
                    token::truncate_to_tokens(self.estimator.as_ref(), &rendered, cap, &options.model);
            }
            let tokens = token::estimate(self.estimator.as_ref(), &rendered, &options.model);
            if total_tokens + tokens > options.max_total_tokens {
                break;
            }
            total_tokens += tokens;

            if hit.writes_record {
                records.push(ActivationRecord::for_activation(
                    hit.entry,
                    chat_id,
                    now,
                    message_count,
                ));
            }
            activated.push(ActivatedEntry {
                entry: hit.entry.clone(),
                position: hit.entry.position,
                order: hit.entry.insertion_order,
                activated_by: hit.activated_by,
                cascade_level: hit.cascade_level,
                rendered,
                tokens,
            });
        }

        if activated.len() < total_hits {
            debug!(
                kept = activated.len(),
                dropped = total_hits - activated.len(),
                total_tokens,
                "Rate limit cut activated entries"
            );
        }
        (activated, records)
    }
}

/// Push targets reversed so they pop in declaration order.
fn push_targets<'a>(stack: &mut Vec<(&'a str, u32)>, entry: &'a KnowledgeEntry, depth: u32) {
    for id in entry.cascade_trigger.iter().rev() {
        stack.push((id.as_str(), depth));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CharCountEstimator;
    use async_trait::async_trait;
    use chrono::Duration;
    use lorekeeper_core::error::EmbeddingError;
    use lorekeeper_store::InMemoryStore;

    fn engine(store: &InMemoryStore) -> ActivationEngine {
        ActivationEngine::new(Arc::new(store.clone()), Arc::new(CharCountEstimator))
    }

    fn keyword(id: &str, order: i64, keys: &[&str]) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(id, id, format!("{id} lore"));
        e.insertion_order = order;
        e.keys = keys.iter().map(|k| k.to_string()).collect();
        e
    }

    fn always(id: &str, order: i64) -> KnowledgeEntry {
        let mut e = keyword(id, order, &[]);
        e.activation_type = ActivationType::Always;
        e
    }

    fn opts(now: DateTime<Utc>) -> ActivationOptions {
        ActivationOptions::default().at(now)
    }

    fn ids(activated: &[ActivatedEntry]) -> Vec<&str> {
        activated.iter().map(|a| a.id()).collect()
    }

    #[tokio::test]
    async fn keyword_hit_writes_record() {
        let store = InMemoryStore::new();
        let entries = vec![keyword("dragon", 10, &["dragon"]), keyword("elf", 5, &["elf"])];
        let now = Utc::now();

        let out = engine(&store)
            .activate("chat", &entries, "I saw a dragon!", &[], &opts(now))
            .await
            .unwrap();

        assert_eq!(ids(&out), vec!["dragon"]);
        assert_eq!(out[0].activated_by, ActivatedBy::Keyword);
        assert_eq!(out[0].rendered, "[dragon]\ndragon lore");
        assert_eq!(out[0].tokens, out[0].rendered.chars().count());
        assert_eq!(store.records_for_chat("chat").await.len(), 1);
    }

    #[tokio::test]
    async fn output_sorted_by_insertion_order_stably() {
        let store = InMemoryStore::new();
        let entries = vec![always("c", 3), always("a", 1), always("b1", 2), always("b2", 2)];
        let out = engine(&store)
            .activate("chat", &entries, "", &[], &opts(Utc::now()))
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["a", "b1", "b2", "c"]);
    }

    #[tokio::test]
    async fn max_entries_cuts_prefix() {
        let store = InMemoryStore::new();
        let entries = vec![always("three", 3), always("one", 1), always("two", 2)];
        let mut options = opts(Utc::now());
        options.max_activated_entries = 2;

        let out = engine(&store)
            .activate("chat", &entries, "", &[], &options)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["one", "two"]);
        let recorded: Vec<String> = store
            .records_for_chat("chat")
            .await
            .into_iter()
            .map(|r| r.entry_id)
            .collect();
        assert_eq!(recorded, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn token_limit_is_greedy_and_monotonic() {
        let entries = vec![always("a", 1), always("b", 2), always("c", 3)];
        // "[a]\na lore" is 10 chars each.
        let mut previous = usize::MAX;
        for limit in (0..=35).rev() {
            let store = InMemoryStore::new();
            let mut options = opts(Utc::now());
            options.max_total_tokens = limit;
            let out = engine(&store)
                .activate("chat", &entries, "", &[], &options)
                .await
                .unwrap();
            let used: usize = out.iter().map(|a| a.tokens).sum();
            assert!(used <= limit);
            assert!(out.len() <= previous);
            assert_eq!(out.len(), (limit / 10).min(3));
            previous = out.len();
        }
    }

    #[tokio::test]
    async fn per_entry_budget_truncates_rendered_text() {
        let store = InMemoryStore::new();
        let mut e = always("long", 1);
        e.content = "x".repeat(100);
        e.token_budget = Some(12);
        let out = engine(&store)
            .activate("chat", &[e], "", &[], &opts(Utc::now()))
            .await
            .unwrap();
        assert_eq!(out[0].tokens, 12);
        assert_eq!(out[0].rendered, "[long]\nxxxxx");
    }

    #[tokio::test]
    async fn cooldown_excludes_next_turn() {
        let store = InMemoryStore::new();
        let mut e1 = keyword("E1", 10, &["dragon"]);
        e1.cooldown = 5;
        let entries = vec![e1];
        let now = Utc::now();
        let engine = engine(&store);

        let first = engine
            .activate("chat", &entries, "I saw a dragon!", &[], &opts(now))
            .await
            .unwrap();
        assert_eq!(first[0].activated_by, ActivatedBy::Keyword);

        let second = engine
            .activate("chat", &entries, "I saw a dragon!", &[], &opts(now + Duration::minutes(1)))
            .await
            .unwrap();
        assert!(second.is_empty());

        let later = engine
            .activate("chat", &entries, "I saw a dragon!", &[], &opts(now + Duration::minutes(5)))
            .await
            .unwrap();
        assert_eq!(ids(&later), vec!["E1"]);
    }

    #[tokio::test]
    async fn sticky_reappears_as_always_without_new_records() {
        let store = InMemoryStore::new();
        let mut e = keyword("ring", 1, &["ring"]);
        e.sticky = 3;
        let entries = vec![e];
        let now = Utc::now();
        let engine = engine(&store);

        engine
            .activate("chat", &entries, "the ring glows", &[], &opts(now))
            .await
            .unwrap();
        for minute in 1..3 {
            let out = engine
                .activate("chat", &entries, "nothing here", &[], &opts(now + Duration::minutes(minute)))
                .await
                .unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].activated_by, ActivatedBy::Always);
        }
        let expired = engine
            .activate("chat", &entries, "nothing here", &[], &opts(now + Duration::minutes(3)))
            .await
            .unwrap();
        assert!(expired.is_empty());
        assert_eq!(store.records_for_chat("chat").await.len(), 1);
    }

    #[tokio::test]
    async fn delay_waits_for_message_count() {
        use lorekeeper_core::store::HistoryStore;

        let store = InMemoryStore::new();
        let mut e = always("late", 1);
        e.delay = 2;
        let entries = vec![e];
        let engine = engine(&store);

        let out = engine.activate("chat", &entries, "", &[], &opts(Utc::now())).await.unwrap();
        assert!(out.is_empty());

        store.append_message("chat", Message::user("one")).await.unwrap();
        store.append_message("chat", Message::assistant("two")).await.unwrap();
        let out = engine.activate("chat", &entries, "", &[], &opts(Utc::now())).await.unwrap();
        assert_eq!(ids(&out), vec!["late"]);
    }

    #[tokio::test]
    async fn disabled_and_broken_entries_never_fire() {
        let store = InMemoryStore::new();
        let mut off = always("off", 1);
        off.enabled = false;
        let mut broken = always("broken", 2);
        broken.load_error = Some("keys: expected value".into());
        let out = engine(&store)
            .activate("chat", &[off, broken, always("ok", 3)], "", &[], &opts(Utc::now()))
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["ok"]);
    }

    #[tokio::test]
    async fn cascades_share_visited_set() {
        let store = InMemoryStore::new();
        let mut a = keyword("a", 1, &["castle"]);
        a.recursive = true;
        a.cascade_trigger = vec!["shared".into(), "b".into()];
        let mut b = keyword("b", 2, &["castle"]);
        b.recursive = true;
        b.cascade_trigger = vec!["shared".into(), "a".into()];
        let shared = keyword("shared", 3, &["never"]);

        let out = engine(&store)
            .activate("chat", &[a, b, shared], "the castle", &[], &opts(Utc::now()))
            .await
            .unwrap();

        assert_eq!(ids(&out), vec!["a", "b", "shared"]);
        let shared = &out[2];
        assert_eq!(shared.activated_by, ActivatedBy::Recursive);
        assert_eq!(shared.cascade_level, 1);
        // `b` matched on its own keywords but was reached first by cascade.
        assert_eq!(out[1].activated_by, ActivatedBy::Recursive);
    }

    #[tokio::test]
    async fn cascade_respects_depth_and_level() {
        let store = InMemoryStore::new();
        let mut root = keyword("root", 1, &["go"]);
        root.recursive = true;
        root.cascade_trigger = vec!["d1".into(), "missing".into()];
        let mut d1 = keyword("d1", 2, &[]);
        d1.recursive = true;
        d1.cascade_trigger = vec!["d2".into(), "only_at_1".into()];
        let mut d2 = keyword("d2", 3, &[]);
        d2.recursive = true;
        d2.cascade_trigger = vec!["d3".into()];
        let d3 = keyword("d3", 4, &[]);
        let mut only_at_1 = keyword("only_at_1", 5, &[]);
        only_at_1.recursive_level = 1;

        let entries = vec![root, d1, d2, d3, only_at_1];
        let mut options = opts(Utc::now());
        options.max_recursion_depth = 2;

        let out = engine(&store)
            .activate("chat", &entries, "go", &[], &options)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["root", "d1", "d2"]);
        assert_eq!(out[2].cascade_level, 2);
    }

    #[tokio::test]
    async fn cascade_skips_cooling_targets() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .put_activation_records(vec![ActivationRecord {
                entry_id: "t".into(),
                chat_id: "chat".into(),
                activated_at: now - Duration::minutes(1),
                expires_at: None,
                cooldown_until: Some(now + Duration::minutes(4)),
                message_count_at_activation: 0,
            }])
            .await
            .unwrap();
        let mut root = always("root", 1);
        root.recursive = true;
        root.cascade_trigger = vec!["t".into()];

        let out = engine(&store)
            .activate("chat", &[root, keyword("t", 2, &[])], "", &[], &opts(now))
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["root"]);
    }

    #[tokio::test]
    async fn regex_respects_switch() {
        let store = InMemoryStore::new();
        let mut e = keyword("blade", 1, &[]);
        e.activation_type = ActivationType::Regex;
        e.regex = Some("/\\bsword\\b/".into());
        let entries = vec![e];
        let mut options = opts(Utc::now());

        let out = engine(&store)
            .activate("chat", &entries, "a sword", &[], &options)
            .await
            .unwrap();
        assert_eq!(out[0].activated_by, ActivatedBy::Regex);

        options.use_regex = false;
        let out = engine(&InMemoryStore::new())
            .activate("chat", &entries, "a sword", &[], &options)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_output() {
        let entries = vec![keyword("a", 2, &["x"]), always("b", 1)];
        let now = Utc::now();
        let first = engine(&InMemoryStore::new())
            .activate("chat", &entries, "x", &[], &opts(now))
            .await
            .unwrap();
        let second = engine(&InMemoryStore::new())
            .activate("chat", &entries, "x", &[], &opts(now))
            .await
            .unwrap();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(
            first.iter().map(|a| &a.rendered).collect::<Vec<_>>(),
            second.iter().map(|a| &a.rendered).collect::<Vec<_>>()
        );
    }

    struct AxisEmbedder;

    #[async_trait]
    impl VectorSimilarity for AxisEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(if text.contains("sea") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
        }
    }

    #[tokio::test]
    async fn vector_entries_need_similarity_capability() {
        let mut e = keyword("ocean", 1, &[]);
        e.activation_type = ActivationType::Vector;
        e.embedding = Some(vec![1.0, 0.0]);
        let entries = vec![e];
        let options = opts(Utc::now());

        let plain = engine(&InMemoryStore::new())
            .activate("chat", &entries, "the sea", &[], &options)
            .await
            .unwrap();
        assert!(plain.is_empty());

        let store = InMemoryStore::new();
        let with_vectors = engine(&store).with_similarity(Arc::new(AxisEmbedder));
        let hit = with_vectors
            .activate("chat", &entries, "the sea", &[], &options)
            .await
            .unwrap();
        assert_eq!(hit[0].activated_by, ActivatedBy::Vector);

        let miss = with_vectors
            .activate("other", &entries, "the hills", &[], &options)
            .await
            .unwrap();
        assert!(miss.is_empty());
    }
}
