//! Budgeted prompt assembly.
//!
//! Renders the system prompt for one turn from four sections, each held to
//! a share of `max_context_tokens - reserve_tokens`.
//!
//! # Sections
//!
//! | Section | Source | Trim Strategy |
//! |---------|--------|---------------|
//! | Character core | Character card | Never trimmed |
//! | World info | Activated entries | Slot tail dropped, first entry kept |
//! | History | Recent turns | Oldest turns replaced by a placeholder |
//! | Examples | Example dialogue | Whole pairs dropped from the back |

pub mod budget;
pub mod builder;
pub mod examples;
pub mod history;
pub mod world_info;

pub use budget::SectionBudgets;
pub use builder::{
    BuildMetadata, BuiltContext, ContextBuildOptions, ContextBuilder, ContextComponents, DropInfo,
    SectionStats, expand_macros,
};
pub use history::HistoryWindow;
pub use world_info::{WorldInfoMode, WorldInfoSection};
