//! Scenario files: one character, its lorebook, a chat so far and the next
//! user message.
//!
//! ```json
//! {
//!   "chat_id": "tavern-1",
//!   "character": { "id": "mara", "name": "Mara", "description": "Cheerful innkeeper" },
//!   "entries": [ { "id": "E1", "name": "Dragon", "content": "...", "keys": ["dragon"] } ],
//!   "history": [ { "role": "user", "content": "Hello!" } ],
//!   "message": "I saw a dragon!"
//! }
//! ```

use chrono::{DateTime, Utc};
use lorekeeper_core::character::Character;
use lorekeeper_core::knowledge::KnowledgeEntry;
use lorekeeper_core::message::Message;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
    pub character: Character,
    #[serde(default)]
    pub entries: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub history: Vec<Message>,
    pub message: String,
    /// Pin the activation clock.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

fn default_chat_id() -> String {
    "scenario".into()
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario {}: {e}", path.display()))?;
        Self::parse(&raw).map_err(|e| format!("Invalid scenario {}: {e}", path.display()).into())
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let mut scenario: Self = serde_json::from_str(raw)?;
        // Entries without an owner belong to the scenario's character.
        for entry in &mut scenario.entries {
            if entry.character_id.is_empty() {
                entry.character_id = scenario.character.id.clone();
            }
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_scenario_parses() {
        let s = Scenario::parse(
            r#"{"character": {"id": "mara", "name": "Mara"}, "message": "hi"}"#,
        )
        .unwrap();
        assert_eq!(s.chat_id, "scenario");
        assert!(s.entries.is_empty());
        assert!(s.now.is_none());
    }

    #[test]
    fn entries_inherit_character_id() {
        let s = Scenario::parse(
            r#"{
                "character": {"id": "mara", "name": "Mara"},
                "entries": [
                    {"id": "a", "name": "A", "content": "x"},
                    {"id": "b", "name": "B", "content": "y", "character_id": "other"}
                ],
                "history": [{"role": "user", "content": "hello"}],
                "message": "hi"
            }"#,
        )
        .unwrap();
        assert_eq!(s.entries[0].character_id, "mara");
        assert_eq!(s.entries[1].character_id, "other");
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn missing_message_is_rejected() {
        assert!(Scenario::parse(r#"{"character": {"id": "m", "name": "M"}}"#).is_err());
    }
}
