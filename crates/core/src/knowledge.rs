//! Knowledge entries (lorebook / world info) and their activation state.
//!
//! A knowledge entry is a reusable snippet of world or setting text that is
//! conditionally inserted into the prompt. Whether it is inserted on a given
//! turn is decided by the activation engine; the only state that survives a
//! build is the [`ActivationRecord`] written for each activation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How an entry decides that it is relevant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationType {
    /// Inserted every turn.
    Always,
    /// Primary/secondary keyword matching.
    #[default]
    Keyword,
    /// A stored regular expression tested against the current message.
    Regex,
    /// Embedding similarity (only with a similarity capability).
    Vector,
}

/// How secondary keywords modulate the primary keyword match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectiveLogic {
    /// Every primary keyword must match.
    AndAll,
    /// At least one primary matches and no secondary keyword does.
    NotAll,
    /// At least one primary matches; secondary keywords are ignored.
    #[default]
    AndAny,
}

/// Named insertion point in the final template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    BeforeChar,
    AfterChar,
    BeforeExamples,
    AfterExamples,
    AfterHistory,
    AuthorsNote,
}

impl Position {
    /// All slots, in template order.
    pub const ALL: [Position; 6] = [
        Position::BeforeChar,
        Position::AfterChar,
        Position::BeforeExamples,
        Position::AfterExamples,
        Position::AfterHistory,
        Position::AuthorsNote,
    ];

    /// Key under which the slot's text is exposed to templates.
    pub fn template_key(self) -> &'static str {
        match self {
            Position::BeforeChar => "wi_before_char",
            Position::AfterChar => "wi_after_char",
            Position::BeforeExamples => "wi_before_examples",
            Position::AfterExamples => "wi_after_examples",
            Position::AfterHistory => "wi_after_history",
            Position::AuthorsNote => "wi_authors_note",
        }
    }
}

/// A single knowledge entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique ID for this entry
    pub id: String,

    /// Owning character
    #[serde(default)]
    pub character_id: String,

    pub name: String,

    pub content: String,

    /// Primary keywords
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    /// Secondary keywords (used by `NOT_ALL`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_keys: Vec<String>,

    #[serde(default)]
    pub activation_type: ActivationType,

    #[serde(default)]
    pub position: Position,

    /// Lower values are inserted first.
    #[serde(default)]
    pub insertion_order: i64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether activating this entry evaluates `cascade_trigger`.
    #[serde(default)]
    pub recursive: bool,

    /// Entry ids evaluated when this entry activates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cascade_trigger: Vec<String>,

    /// Cascade depth this entry may fire at; 0 means any depth.
    #[serde(default)]
    pub recursive_level: u32,

    /// Minutes the entry stays active after firing.
    #[serde(default)]
    pub sticky: u32,

    /// Minutes the entry is suppressed after firing.
    #[serde(default)]
    pub cooldown: u32,

    /// Prior chat messages required before the first activation.
    #[serde(default)]
    pub delay: u32,

    /// Cap on this entry's rendered size, in estimated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<usize>,

    #[serde(default)]
    pub selective_logic: SelectiveLogic,

    /// `/pattern/flags` or a bare pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// How many prior messages the keyword scan looks back over.
    #[serde(default)]
    pub min_activations: usize,

    /// Template with `{name}` / `{content}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_template: Option<String>,

    /// Precomputed embedding for vector-type entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Set by a store when a stored list column could not be parsed.
    /// Such entries never trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl KnowledgeEntry {
    /// A keyword entry with everything else at its default.
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            character_id: String::new(),
            name: name.into(),
            content: content.into(),
            keys: Vec::new(),
            secondary_keys: Vec::new(),
            activation_type: ActivationType::Keyword,
            position: Position::BeforeChar,
            insertion_order: 0,
            enabled: true,
            recursive: false,
            cascade_trigger: Vec::new(),
            recursive_level: 0,
            sticky: 0,
            cooldown: 0,
            delay: 0,
            token_budget: None,
            selective_logic: SelectiveLogic::AndAny,
            regex: None,
            min_activations: 0,
            insertion_template: None,
            embedding: None,
            load_error: None,
        }
    }

    /// The text this entry contributes to the prompt, before any truncation.
    pub fn insertion_text(&self) -> String {
        match self.insertion_template.as_deref() {
            Some(template) if !template.is_empty() => template
                .replace("{name}", &self.name)
                .replace("{content}", &self.content),
            _ => format!("[{}]\n{}", self.name, self.content),
        }
    }

    /// Parse a stored JSON string list column (e.g. `["dragon","wyrm"]`).
    pub fn parse_list(raw: &str) -> Result<Vec<String>, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(raw)
    }
}

/// One activation event for an (entry, chat) pair.
///
/// Only the most recent record per pair is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub entry_id: String,
    pub chat_id: String,
    pub activated_at: DateTime<Utc>,
    /// End of the sticky window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// End of the cooldown window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub message_count_at_activation: usize,
}

impl ActivationRecord {
    /// Record for `entry` firing at `now`. Sticky and cooldown are minutes.
    pub fn for_activation(
        entry: &KnowledgeEntry,
        chat_id: &str,
        now: DateTime<Utc>,
        message_count: usize,
    ) -> Self {
        let window = |minutes: u32| {
            (minutes > 0).then(|| now + Duration::milliseconds(i64::from(minutes) * 60_000))
        };
        Self {
            entry_id: entry.id.clone(),
            chat_id: chat_id.to_string(),
            activated_at: now,
            expires_at: window(entry.sticky),
            cooldown_until: window(entry.cooldown),
            message_count_at_activation: message_count,
        }
    }
}

/// What caused an entry to activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivatedBy {
    Keyword,
    Regex,
    Vector,
    Recursive,
    Always,
}

/// An entry selected for this build.
#[derive(Debug, Clone, Serialize)]
pub struct ActivatedEntry {
    pub entry: KnowledgeEntry,
    pub position: Position,
    pub order: i64,
    pub activated_by: ActivatedBy,
    /// 0 for direct hits, otherwise the cascade depth.
    pub cascade_level: u32,
    /// Insertion text after per-entry truncation.
    pub rendered: String,
    /// Estimated tokens of `rendered`.
    pub tokens: usize,
}

impl ActivatedEntry {
    pub fn id(&self) -> &str {
        &self.entry.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_insertion_text_uses_bracketed_name() {
        let entry = KnowledgeEntry::new("e1", "Dragons", "Dragons hoard gold.");
        assert_eq!(entry.insertion_text(), "[Dragons]\nDragons hoard gold.");
    }

    #[test]
    fn insertion_template_substitutes_placeholders() {
        let mut entry = KnowledgeEntry::new("e1", "Dragons", "They hoard gold.");
        entry.insertion_template = Some("<lore name=\"{name}\">{content}</lore>".into());
        assert_eq!(
            entry.insertion_text(),
            "<lore name=\"Dragons\">They hoard gold.</lore>"
        );
    }

    #[test]
    fn record_windows_are_minutes() {
        let mut entry = KnowledgeEntry::new("e1", "n", "c");
        entry.sticky = 2;
        entry.cooldown = 5;
        let now = Utc::now();
        let record = ActivationRecord::for_activation(&entry, "chat", now, 3);
        assert_eq!(record.expires_at, Some(now + Duration::minutes(2)));
        assert_eq!(record.cooldown_until, Some(now + Duration::minutes(5)));
        assert_eq!(record.message_count_at_activation, 3);
    }

    #[test]
    fn zero_windows_are_absent() {
        let entry = KnowledgeEntry::new("e1", "n", "c");
        let record = ActivationRecord::for_activation(&entry, "chat", Utc::now(), 0);
        assert!(record.expires_at.is_none());
        assert!(record.cooldown_until.is_none());
    }

    #[test]
    fn selective_logic_uses_screaming_case() {
        let logic: SelectiveLogic = serde_json::from_str("\"NOT_ALL\"").unwrap();
        assert_eq!(logic, SelectiveLogic::NotAll);
    }

    #[test]
    fn parse_list_rejects_malformed_json() {
        assert_eq!(
            KnowledgeEntry::parse_list(r#"["a","b"]"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(KnowledgeEntry::parse_list("[\"unterminated").is_err());
        assert!(KnowledgeEntry::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn entry_defaults_from_minimal_json() {
        let entry: KnowledgeEntry =
            serde_json::from_str(r#"{"id":"e","name":"n","content":"c"}"#).unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.activation_type, ActivationType::Keyword);
        assert_eq!(entry.selective_logic, SelectiveLogic::AndAny);
    }
}
