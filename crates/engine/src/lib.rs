//! Prompt assembly for one roleplay turn.
//!
//! The engine follows an **Activate → Budget → Render** cycle:
//!
//! 1. **Fetch** entries and history for the chat (from the stores, or
//!    supplied by the caller)
//! 2. **Activate** knowledge entries: timing gate, triggers, cascades,
//!    then a greedy rate limit
//! 3. **Budget** the context window across character, world info, history
//!    and examples
//! 4. **Render** the system prompt through a named template
//! 5. **Return** `[system, user]` for the caller to send to a provider
//!
//! Activation records are written only after step 2 completes.

pub mod activation;
pub mod context;
pub mod pipeline;
pub mod template;
pub mod token;

pub use activation::{ActivationEngine, ActivationOptions, GateState};
pub use context::{
    BuildMetadata, BuiltContext, ContextBuildOptions, ContextBuilder, ContextComponents, DropInfo,
    SectionBudgets, SectionStats,
};
pub use pipeline::{ChatLocks, EntrySource, PreparedPrompt, PromptPipeline, PromptRequest};
pub use template::TemplateEngine;
pub use token::{CharCountEstimator, HeuristicEstimator};
