//! Character card: the persona definition a chat is built around.

use serde::{Deserialize, Serialize};

/// A character card as supplied by the caller.
///
/// Text fields may contain `{{char}}` / `{{user}}` macros; the context
/// builder expands them before rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Character {
    /// Identifier used to look up the character's knowledge entries.
    pub id: String,

    /// Display name, substituted for `{{char}}`.
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub personality: String,

    #[serde(default)]
    pub scenario: String,

    /// Example dialogue, legacy block or structured pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_dialogue: Option<ExampleDialogue>,

    /// Character-specific system prompt.
    #[serde(default)]
    pub system_prompt: String,

    #[serde(default)]
    pub post_history_instructions: String,

    /// Overrides placed ahead of everything else in the prompt.
    #[serde(default)]
    pub jailbreak: String,

    #[serde(default)]
    pub authors_note: String,
}

/// Example dialogue in either of the two supported shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExampleDialogue {
    /// Structured list of user/assistant exchanges.
    Pairs(Vec<ExamplePair>),
    /// Legacy alternating-line block (`<START>` separated, `{{user}}:` prefixed).
    Legacy(String),
}

/// One example exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamplePair {
    pub user: String,
    pub assistant: String,
}
