//! Store implementations for Lorekeeper.
//!
//! Both backends implement [`KnowledgeStore`](lorekeeper_core::KnowledgeStore)
//! and [`HistoryStore`](lorekeeper_core::HistoryStore).

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
