//! Context builder: budgets sections and renders the system prompt.
//!
//! Sections, in the order the budget is spent:
//!
//! 1. **Character core** (description, personality, scenario, prompts): never trimmed
//! 2. **World info** (activated entries per slot): tail of each slot dropped
//! 3. **History** (recent turns): oldest turns replaced by one placeholder line
//! 4. **Examples** (dialogue pairs): whole pairs dropped from the back
//!
//! After rendering, a fit pass shrinks history, then examples, then world info
//! until the system message fits `max_context_tokens - reserve_tokens`.
//!
//! # Determinism
//!
//! Without a summarizer, identical inputs always render identical output.

use super::budget::SectionBudgets;
use super::examples::{parse_examples, render_examples};
use super::history::{
    HistoryWindow, fit_summary_line, hidden_placeholder, summarize_or_fallback,
};
use super::world_info::{WorldInfoMode, WorldInfoSection, render_world_info};
use crate::token;
use lorekeeper_config::ContextConfig;
use lorekeeper_core::capability::{Summarizer, TemplateRenderer, TokenEstimator};
use lorekeeper_core::character::{Character, ExamplePair};
use lorekeeper_core::error::Result;
use lorekeeper_core::knowledge::{ActivatedEntry, Position};
use lorekeeper_core::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on history shrink passes before history is cut to nothing.
const MAX_FIT_PASSES: usize = 8;

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-build rendering options.
#[derive(Debug, Clone)]
pub struct ContextBuildOptions {
    pub max_context_tokens: usize,
    pub reserve_tokens: usize,
    /// Model id handed to the token estimator.
    pub model: String,
    /// Registered template name.
    pub template: String,
    pub enable_summary: bool,
    pub summary_timeout: Duration,
    /// Display name substituted for `{{user}}`.
    pub user_name: String,
    pub separator: String,
    pub chat_start: String,
}

impl ContextBuildOptions {
    pub fn from_config(config: &ContextConfig, model: impl Into<String>) -> Self {
        Self {
            max_context_tokens: config.max_context_tokens,
            reserve_tokens: config.reserve_tokens,
            model: model.into(),
            template: config.template.clone(),
            enable_summary: config.enable_summary,
            summary_timeout: Duration::from_secs(config.summary_timeout_secs),
            user_name: config.user_name.clone(),
            separator: config.separator.clone(),
            chat_start: config.chat_start.clone(),
        }
    }
}

impl Default for ContextBuildOptions {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default(), "gpt-4o")
    }
}

/// Rendered section texts, kept for inspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextComponents {
    /// Character core after macro expansion, separator-joined.
    pub character: String,
    pub world_info: BTreeMap<Position, String>,
    pub history: String,
    pub examples: String,
}

/// Statistics for a single section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionStats {
    /// Section name.
    pub name: String,
    /// Tokens consumed by this section.
    pub tokens: usize,
    /// Items included after budget trimming.
    pub items_included: usize,
    /// Total items available before trimming.
    pub items_total: usize,
}

/// Information about items dropped from a section during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    /// Which section.
    pub layer: String,
    /// Number of items dropped.
    pub items_dropped: usize,
    /// Estimated tokens of dropped content.
    pub tokens_dropped: usize,
    /// Reason for dropping.
    pub reason: String,
}

/// Usage report for one build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildMetadata {
    /// `max_context_tokens - reserve_tokens`.
    pub available_tokens: usize,
    pub budgets: SectionBudgets,
    /// Estimated tokens of the rendered system message.
    pub total_tokens: usize,
    /// Estimated tokens of the user message.
    pub user_tokens: usize,
    /// `total_tokens / available_tokens` as a percentage.
    pub utilization_pct: f32,
    pub per_section: Vec<SectionStats>,
    pub drops: Vec<DropInfo>,
    /// Set when the character core alone does not fit.
    pub over_budget: bool,
    /// Renders performed, including the first.
    pub fit_passes: usize,
}

/// The output of a build: `[system, user]` plus what went into it.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub messages: Vec<Message>,
    pub components: ContextComponents,
    pub metadata: BuildMetadata,
}

impl BuiltContext {
    pub fn system_message(&self) -> &str {
        self.messages.first().map_or("", |m| m.content.as_str())
    }
}

pub(crate) fn empty_stats(name: &str, total: usize) -> SectionStats {
    SectionStats {
        name: name.into(),
        tokens: 0,
        items_included: 0,
        items_total: total,
    }
}

pub(crate) fn maybe_drop(
    layer: &str,
    dropped: usize,
    tokens: usize,
    reason: &str,
) -> Option<DropInfo> {
    if dropped > 0 {
        Some(DropInfo {
            layer: layer.into(),
            items_dropped: dropped,
            tokens_dropped: tokens,
            reason: reason.into(),
        })
    } else {
        None
    }
}

/// Replace `{{char}}`, `{{user}}`, `<BOT>` and `<USER>`.
pub fn expand_macros(text: &str, char_name: &str, user_name: &str) -> String {
    text.replace("{{char}}", char_name)
        .replace("<BOT>", char_name)
        .replace("{{user}}", user_name)
        .replace("<USER>", user_name)
}

/// Character fields after macro expansion.
struct CharacterCore {
    name: String,
    description: String,
    personality: String,
    scenario: String,
    system_prompt: String,
    jailbreak: String,
    authors_note: String,
    post_history_instructions: String,
}

impl CharacterCore {
    fn new(character: &Character, user_name: &str) -> Self {
        let expand = |text: &str| expand_macros(text.trim(), &character.name, user_name);
        Self {
            name: character.name.clone(),
            description: expand(&character.description),
            personality: expand(&character.personality),
            scenario: expand(&character.scenario),
            system_prompt: expand(&character.system_prompt),
            jailbreak: expand(&character.jailbreak),
            authors_note: expand(&character.authors_note),
            post_history_instructions: expand(&character.post_history_instructions),
        }
    }

    fn text(&self, separator: &str) -> String {
        [
            &self.jailbreak,
            &self.system_prompt,
            &self.description,
            &self.personality,
            &self.scenario,
            &self.authors_note,
            &self.post_history_instructions,
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(separator)
    }
}

/// What the fit pass currently allows.
#[derive(Debug, Clone, Copy)]
struct FitState {
    history_budget: usize,
    world_info: WorldInfoMode,
    examples: bool,
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Renders the prompt for one turn.
pub struct ContextBuilder {
    estimator: Arc<dyn TokenEstimator>,
    renderer: Arc<dyn TemplateRenderer>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ContextBuilder {
    pub fn new(estimator: Arc<dyn TokenEstimator>, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            estimator,
            renderer,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Build the `[system, user]` message pair.
    ///
    /// # Algorithm
    ///
    /// 1. Allocate section budgets from `available = max_context - reserve`
    /// 2. Render world info, history and examples within their shares
    /// 3. Render the named template over the data map
    /// 4. While the system message exceeds `available`: shrink history, drop
    ///    examples, keep one world-info entry per slot, drop world info
    /// 5. If it still does not fit, flag `over_budget`
    ///
    /// Template failures are returned as errors; budget exhaustion is not.
    pub async fn build(
        &self,
        character: &Character,
        history: &[Message],
        activated: &[ActivatedEntry],
        user_message: &str,
        options: &ContextBuildOptions,
    ) -> Result<BuiltContext> {
        let estimator = self.estimator.as_ref();
        let model = options.model.as_str();
        let budgets = SectionBudgets::allocate(
            options.max_context_tokens,
            options.reserve_tokens,
            !activated.is_empty(),
        );
        let available = budgets.available;

        // ── Character core (always included, never trimmed) ───────────────
        let core = CharacterCore::new(character, &options.user_name);
        let core_text = core.text(&options.separator);
        let core_tokens = token::estimate(estimator, &core_text, model);
        let mut over_budget = core_tokens > available;
        if over_budget {
            warn!(
                character = %character.name,
                core_tokens,
                available,
                "Character core alone exceeds the context budget"
            );
        }

        let example_pairs = character
            .example_dialogue
            .as_ref()
            .map(parse_examples)
            .unwrap_or_default();

        let mut state = FitState {
            history_budget: budgets.history,
            world_info: WorldInfoMode::Budgeted,
            examples: true,
        };
        let mut summaries: HashMap<usize, String> = HashMap::new();
        let mut passes = 0;
        let mut history_passes = 0;

        loop {
            passes += 1;

            // ── World info ─────────────────────────────────────────────────
            let (wi_section, wi_stats, wi_drop) = render_world_info(
                activated,
                budgets.world_info,
                state.world_info,
                estimator,
                model,
            );

            // ── History ────────────────────────────────────────────────────
            let window = HistoryWindow::select(history, state.history_budget, estimator, model);
            let placeholder = self
                .placeholder(&window, history, state.history_budget, options, &mut summaries)
                .await;
            let history_text = window.render(placeholder.as_deref());
            let (hist_stats, hist_drop) = window.stats(
                &history_text,
                options.enable_summary,
                estimator,
                model,
            );

            // ── Examples ───────────────────────────────────────────────────
            let shown_pairs: &[ExamplePair] = if state.examples { &example_pairs } else { &[] };
            let (example_blocks, mut ex_stats, mut ex_drop) = render_examples(
                shown_pairs,
                &core.name,
                &options.user_name,
                budgets.system,
                estimator,
                model,
            );
            if !state.examples && !example_pairs.is_empty() {
                ex_stats.items_total = example_pairs.len();
                ex_drop = maybe_drop(
                    "examples",
                    example_pairs.len(),
                    0,
                    "Examples omitted to fit context",
                );
            }
            let examples_text = example_blocks.join("\n");
            let shown_pair_count = ex_stats.items_included;

            // ── Render ─────────────────────────────────────────────────────
            let data = Self::data_map(
                &core,
                options,
                &wi_section,
                &history_text,
                &examples_text,
                &shown_pairs[..shown_pair_count],
            );
            let system = self.renderer.render(&options.template, &data)?;
            let total_tokens = token::estimate(estimator, &system, model);

            let fits = total_tokens <= available;
            if !fits && !over_budget {
                let overflow = total_tokens - available;
                if !window.lines.is_empty() && history_passes < MAX_FIT_PASSES {
                    history_passes += 1;
                    state.history_budget = window.line_tokens.saturating_sub(overflow);
                    if history_passes == MAX_FIT_PASSES {
                        state.history_budget = 0;
                    }
                    debug!(
                        overflow,
                        history_budget = state.history_budget,
                        "Shrinking history to fit"
                    );
                    continue;
                }
                if state.examples && shown_pair_count > 0 {
                    debug!(overflow, "Dropping examples to fit");
                    state.examples = false;
                    continue;
                }
                let crowded_slot = wi_section.entries.len() > wi_section.slots.len();
                if state.world_info == WorldInfoMode::Budgeted && crowded_slot {
                    debug!(overflow, "Keeping one world-info entry per slot to fit");
                    state.world_info = WorldInfoMode::FirstPerSlot;
                    continue;
                }
                if state.world_info != WorldInfoMode::Omitted && !wi_section.is_empty() {
                    debug!(overflow, "Dropping world info to fit");
                    state.world_info = WorldInfoMode::Omitted;
                    continue;
                }
                warn!(total_tokens, available, "Rendered prompt exceeds the context budget");
                over_budget = true;
            }

            let user_tokens = token::estimate(estimator, user_message, model);
            let per_section = vec![
                SectionStats {
                    name: "character".into(),
                    tokens: core_tokens,
                    items_included: 1,
                    items_total: 1,
                },
                wi_stats,
                hist_stats,
                ex_stats,
            ];
            let drops: Vec<DropInfo> = [wi_drop, hist_drop, ex_drop].into_iter().flatten().collect();
            let utilization_pct = if available == 0 {
                0.0
            } else {
                (total_tokens as f32 / available as f32) * 100.0
            };

            debug!(
                total_tokens,
                available,
                passes,
                over_budget,
                "Context built"
            );

            return Ok(BuiltContext {
                messages: vec![Message::system(system), Message::user(user_message)],
                components: ContextComponents {
                    character: core_text,
                    world_info: wi_section.slots,
                    history: history_text,
                    examples: examples_text,
                },
                metadata: BuildMetadata {
                    available_tokens: available,
                    budgets,
                    total_tokens,
                    user_tokens,
                    utilization_pct,
                    per_section,
                    drops,
                    over_budget,
                    fit_passes: passes,
                },
            });
        }
    }

    /// Placeholder line for omitted history, summarized at most once per
    /// omitted count.
    ///
    /// A summary line may use what is left of the history share, or the
    /// size of the hidden placeholder if that is larger.
    async fn placeholder(
        &self,
        window: &HistoryWindow,
        history: &[Message],
        history_budget: usize,
        options: &ContextBuildOptions,
        summaries: &mut HashMap<usize, String>,
    ) -> Option<String> {
        if window.omitted == 0 {
            return None;
        }
        if !options.enable_summary {
            return Some(hidden_placeholder(window.omitted));
        }
        let summary = match summaries.get(&window.omitted) {
            Some(cached) => cached.clone(),
            None => {
                let summary = summarize_or_fallback(
                    self.summarizer.as_deref(),
                    &history[..window.omitted],
                    options.summary_timeout,
                )
                .await;
                summaries.insert(window.omitted, summary.clone());
                summary
            }
        };
        let estimator = self.estimator.as_ref();
        let model = options.model.as_str();
        let hidden = hidden_placeholder(window.omitted);
        let room = history_budget
            .saturating_sub(window.line_tokens)
            .max(token::estimate(estimator, &hidden, model));
        Some(fit_summary_line(window.omitted, &summary, room, estimator, model))
    }

    fn data_map(
        core: &CharacterCore,
        options: &ContextBuildOptions,
        world_info: &WorldInfoSection,
        history: &str,
        examples: &str,
        pairs: &[ExamplePair],
    ) -> Value {
        let mut map = Map::new();
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        put("char", json!(core.name));
        put("user", json!(options.user_name));
        put("description", json!(core.description));
        put("personality", json!(core.personality));
        put("scenario", json!(core.scenario));
        put("system_prompt", json!(core.system_prompt));
        put("jailbreak", json!(core.jailbreak));
        put("authors_note", json!(core.authors_note));
        put("post_history_instructions", json!(core.post_history_instructions));
        put("separator", json!(options.separator));
        put("chat_start", json!(options.chat_start));
        put("history", json!(history));
        put("examples", json!(examples));
        for position in Position::ALL {
            let text = world_info.slots.get(&position).cloned().unwrap_or_default();
            put(position.template_key(), json!(text));
        }
        put("has_world_info", json!(!world_info.is_empty()));
        put("world_info", json!(world_info.entries));
        let pairs: Vec<Value> = pairs
            .iter()
            .map(|p| {
                json!({
                    "user": expand_macros(&p.user, &core.name, &options.user_name),
                    "assistant": expand_macros(&p.assistant, &core.name, &options.user_name),
                })
            })
            .collect();
        put("example_pairs", Value::Array(pairs));
        Value::Object(map)
    }
}
