//! Keyword and regex trigger matching.

use lorekeeper_core::knowledge::{KnowledgeEntry, SelectiveLogic};
use lorekeeper_core::message::Message;
use regex_lite::Regex;
use tracing::warn;

/// Lowercased text the keyword matcher scans: the current message plus the
/// last `lookback` history messages.
pub fn scan_text(current_message: &str, history: &[Message], lookback: usize) -> String {
    let start = history.len().saturating_sub(lookback);
    let mut text = current_message.to_lowercase();
    for message in &history[start..] {
        text.push('\n');
        text.push_str(&message.content.to_lowercase());
    }
    text
}

/// Case-insensitive substring match of the entry's keywords against
/// already-lowercased `haystack`.
pub fn keywords_match(entry: &KnowledgeEntry, haystack: &str) -> bool {
    let hit = |key: &String| {
        let key = key.trim();
        !key.is_empty() && haystack.contains(&key.to_lowercase())
    };
    let primary: Vec<&String> = entry.keys.iter().filter(|k| !k.trim().is_empty()).collect();
    if primary.is_empty() {
        return false;
    }

    match entry.selective_logic {
        SelectiveLogic::AndAny => primary.iter().any(|k| hit(*k)),
        SelectiveLogic::AndAll => primary.iter().all(|k| hit(*k)),
        SelectiveLogic::NotAll => {
            primary.iter().any(|k| hit(*k)) && !entry.secondary_keys.iter().any(|k| hit(k))
        }
    }
}

/// Compile a `/pattern/flags` or bare pattern. Bare patterns are
/// case-insensitive. `g`, `u` and `y` are accepted and ignored.
pub fn compile_pattern(raw: &str) -> Result<Regex, String> {
    let (pattern, flags) = match raw
        .strip_prefix('/')
        .and_then(|rest| rest.rfind('/').map(|end| (&rest[..end], &rest[end + 1..])))
    {
        Some((pattern, flags)) => (pattern, flags),
        None => (raw, "i"),
    };

    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            'g' | 'u' | 'y' => {}
            other => return Err(format!("unsupported regex flag '{other}'")),
        }
    }

    let source = if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{inline}){pattern}")
    };
    Regex::new(&source).map_err(|e| e.to_string())
}

/// Test the entry's stored pattern against the current message.
/// Missing or invalid patterns never match.
pub fn regex_matches(entry: &KnowledgeEntry, current_message: &str) -> bool {
    let Some(raw) = entry.regex.as_deref().filter(|r| !r.is_empty()) else {
        return false;
    };
    match compile_pattern(raw) {
        Ok(re) => re.is_match(current_message),
        Err(e) => {
            warn!(entry = %entry.id, pattern = raw, "Invalid regex, entry will not trigger: {e}");
            false
        }
    }
}
