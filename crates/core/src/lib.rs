//! # Lorekeeper Core
//!
//! Domain types, traits, and error definitions for the Lorekeeper prompt
//! assembly engine. This crate has **no framework dependencies**: it defines
//! the model that the store, engine and CLI crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (stores, token estimation, template rendering,
//! summarization, vector similarity) is a trait here. Implementations live in
//! their respective crates, which keeps the engine testable with deterministic
//! stand-ins.

pub mod capability;
pub mod character;
pub mod error;
pub mod knowledge;
pub mod message;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use capability::{Summarizer, TemplateRenderer, TokenEstimator, VectorSimilarity};
pub use character::{Character, ExampleDialogue, ExamplePair};
pub use error::{Error, Result};
pub use knowledge::{
    ActivatedBy, ActivatedEntry, ActivationRecord, ActivationType, KnowledgeEntry, Position,
    SelectiveLogic,
};
pub use message::{ChatId, Message, Role};
pub use store::{HistoryStore, KnowledgeStore};
