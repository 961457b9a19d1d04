//! Example dialogue section.
//!
//! Legacy blocks look like:
//!
//! ```text
//! <START>
//! {{user}}: Hello there.
//! {{char}}: Welcome to the Gilded Goose!
//! <START>
//! <USER>: Any rooms free?
//! <BOT>: Just the one upstairs.
//! ```

use super::builder::{DropInfo, SectionStats, empty_stats, expand_macros, maybe_drop};
use crate::token;
use lorekeeper_core::capability::TokenEstimator;
use lorekeeper_core::character::{ExampleDialogue, ExamplePair};

const START_MARKER: &str = "<START>";
const USER_PREFIXES: [&str; 2] = ["{{user}}:", "<USER>:"];
const CHAR_PREFIXES: [&str; 2] = ["{{char}}:", "<BOT>:"];

fn strip_speaker(line: &str) -> &str {
    USER_PREFIXES
        .iter()
        .chain(CHAR_PREFIXES.iter())
        .find_map(|prefix| line.strip_prefix(prefix))
        .unwrap_or(line)
        .trim()
}

/// Normalize either dialogue form into user/assistant pairs.
///
/// Legacy lines alternate user then assistant within each `<START>` block;
/// a trailing unpaired line is dropped.
pub fn parse_examples(dialogue: &ExampleDialogue) -> Vec<ExamplePair> {
    match dialogue {
        ExampleDialogue::Pairs(pairs) => pairs
            .iter()
            .filter(|p| !p.user.trim().is_empty() || !p.assistant.trim().is_empty())
            .cloned()
            .collect(),
        ExampleDialogue::Legacy(text) => text
            .split(START_MARKER)
            .flat_map(|block| {
                let lines: Vec<&str> = block
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(strip_speaker)
                    .collect();
                lines
                    .chunks_exact(2)
                    .map(|pair| ExamplePair {
                        user: pair[0].to_string(),
                        assistant: pair[1].to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect(),
    }
}

/// `"<START>\n{user}: …\n{char}: …"`, with macros in the pair expanded.
pub fn format_pair(pair: &ExamplePair, char_name: &str, user_name: &str) -> String {
    let expand = |text: &str| expand_macros(text, char_name, user_name);
    format!(
        "{START_MARKER}\n{user_name}: {}\n{char_name}: {}",
        expand(&pair.user),
        expand(&pair.assistant)
    )
}

/// Append whole pairs while they fit `budget`, measured after expansion.
pub fn render_examples(
    pairs: &[ExamplePair],
    char_name: &str,
    user_name: &str,
    budget: usize,
    estimator: &dyn TokenEstimator,
    model: &str,
) -> (Vec<String>, SectionStats, Option<DropInfo>) {
    let layer = "examples";
    if pairs.is_empty() {
        return (Vec::new(), empty_stats(layer, 0), None);
    }

    let mut blocks = Vec::new();
    let mut used = 0;
    let mut dropped_tokens = 0;

    for (i, pair) in pairs.iter().enumerate() {
        let block = format_pair(pair, char_name, user_name);
        let tokens = token::estimate(estimator, &block, model);
        if used + tokens > budget {
            dropped_tokens = pairs[i..]
                .iter()
                .map(|p| token::estimate(estimator, &format_pair(p, char_name, user_name), model))
                .sum();
            break;
        }
        used += tokens;
        blocks.push(block);
    }

    let dropped = pairs.len() - blocks.len();
    let stats = SectionStats {
        name: layer.into(),
        tokens: used,
        items_included: blocks.len(),
        items_total: pairs.len(),
    };
    (
        blocks,
        stats,
        maybe_drop(layer, dropped, dropped_tokens, "Example pairs beyond the system share"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CharCountEstimator;

    fn pair(u: &str, a: &str) -> ExamplePair {
        ExamplePair {
            user: u.into(),
            assistant: a.into(),
        }
    }

    #[test]
    fn legacy_block_strips_prefixes() {
        let raw = "<START>\n{{user}}: Hello there.\n{{char}}: Welcome!\n<START>\n<USER>: Rooms?\n<BOT>: One left.";
        let pairs = parse_examples(&ExampleDialogue::Legacy(raw.into()));
        assert_eq!(
            pairs,
            vec![pair("Hello there.", "Welcome!"), pair("Rooms?", "One left.")]
        );
    }

    #[test]
    fn legacy_trailing_line_dropped() {
        let raw = "{{user}}: a\n{{char}}: b\n{{user}}: dangling";
        let pairs = parse_examples(&ExampleDialogue::Legacy(raw.into()));
        assert_eq!(pairs, vec![pair("a", "b")]);
    }

    #[test]
    fn structured_pairs_pass_through() {
        let pairs = parse_examples(&ExampleDialogue::Pairs(vec![pair("hi", "hello"), pair("", "")]));
        assert_eq!(pairs, vec![pair("hi", "hello")]);
    }

    #[test]
    fn pair_format_names_speakers() {
        assert_eq!(
            format_pair(&pair("hi", "hello"), "Mara", "Tom"),
            "<START>\nTom: hi\nMara: hello"
        );
    }

    #[test]
    fn only_whole_pairs_fit() {
        let pairs = vec![pair("aa", "bb"), pair("cc", "dd"), pair("ee", "ff")];
        // Each block: "<START>\nU: aa\nC: bb" = 7 + 1 + 5 + 1 + 5 = 19 chars.
        let (blocks, stats, drop) = render_examples(&pairs, "C", "U", 45, &CharCountEstimator, "m");
        assert_eq!(blocks.len(), 2);
        assert_eq!(stats.tokens, 38);
        assert_eq!(drop.unwrap().items_dropped, 1);

        let (blocks, _, _) = render_examples(&pairs, "C", "U", 18, &CharCountEstimator, "m");
        assert!(blocks.is_empty());
    }

    #[test]
    fn pair_format_expands_macros() {
        assert_eq!(
            format_pair(&pair("Hi {{char}}", "Hello <USER>"), "Mara", "Tom"),
            "<START>\nTom: Hi Mara\nMara: Hello Tom"
        );
    }

    #[test]
    fn long_names_count_against_budget() {
        let name = "Bartholomew the Magnificent of the Northern Reaches";
        let pairs = vec![
            pair("{{char}}, {{char}}!", "Yes, {{user}}? I am {{char}}."),
            pair("Farewell, {{char}}.", "Until next time, {{user}}."),
        ];
        let first = format_pair(&pairs[0], name, "Tom");
        let budget = first.chars().count() + 10;

        let (blocks, stats, drop) =
            render_examples(&pairs, name, "Tom", budget, &CharCountEstimator, "m");
        assert_eq!(blocks, vec![first.clone()]);
        assert_eq!(stats.tokens, first.chars().count());
        assert!(stats.tokens <= budget);
        assert!(!blocks[0].contains("{{char}}"));
        assert_eq!(drop.unwrap().items_dropped, 1);
    }
}
