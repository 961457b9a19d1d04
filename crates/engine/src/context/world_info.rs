//! World-info section: activated entries grouped into position slots.

use super::builder::{DropInfo, SectionStats, empty_stats, maybe_drop};
use crate::token;
use lorekeeper_core::capability::TokenEstimator;
use lorekeeper_core::knowledge::{ActivatedEntry, Position};
use std::collections::BTreeMap;

/// How much world info the fit pass still allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldInfoMode {
    /// Fill each slot up to its even share of the budget.
    Budgeted,
    /// Keep only the first entry of each populated slot.
    FirstPerSlot,
    /// No world info at all.
    Omitted,
}

/// Rendered world info.
#[derive(Debug, Clone, Default)]
pub struct WorldInfoSection {
    /// Slot text, entries joined by newlines.
    pub slots: BTreeMap<Position, String>,
    /// Every included entry's text, in slot then insertion order.
    pub entries: Vec<String>,
}

impl WorldInfoSection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `budget` evenly across the populated slots and fill each in order.
///
/// A slot stops at the first entry that would exceed its share, except that
/// the first entry of a slot is always kept.
pub fn render_world_info(
    activated: &[ActivatedEntry],
    budget: usize,
    mode: WorldInfoMode,
    estimator: &dyn TokenEstimator,
    model: &str,
) -> (WorldInfoSection, SectionStats, Option<DropInfo>) {
    let layer = "world_info";
    if activated.is_empty() {
        return (WorldInfoSection::default(), empty_stats(layer, 0), None);
    }

    let mut grouped: BTreeMap<Position, Vec<&ActivatedEntry>> = BTreeMap::new();
    for entry in activated {
        grouped.entry(entry.position).or_default().push(entry);
    }

    if mode == WorldInfoMode::Omitted {
        let dropped_tokens = activated
            .iter()
            .map(|a| token::estimate(estimator, &a.rendered, model))
            .sum();
        return (
            WorldInfoSection::default(),
            empty_stats(layer, activated.len()),
            maybe_drop(layer, activated.len(), dropped_tokens, "World info omitted to fit context"),
        );
    }

    let share = budget / grouped.len();
    let mut section = WorldInfoSection::default();
    let mut used = 0;
    let mut dropped = 0;
    let mut dropped_tokens = 0;

    for (position, entries) in &grouped {
        let mut slot_used = 0;
        let mut lines: Vec<&str> = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let tokens = token::estimate(estimator, &entry.rendered, model);
            let fits = match mode {
                WorldInfoMode::FirstPerSlot => i == 0,
                _ => i == 0 || slot_used + tokens <= share,
            };
            if !fits {
                dropped += entries.len() - i;
                dropped_tokens += entries[i..]
                    .iter()
                    .map(|e| token::estimate(estimator, &e.rendered, model))
                    .sum::<usize>();
                break;
            }
            slot_used += tokens;
            lines.push(entry.rendered.as_str());
            section.entries.push(entry.rendered.clone());
        }
        used += slot_used;
        section.slots.insert(*position, lines.join("\n"));
    }

    let reason = match mode {
        WorldInfoMode::FirstPerSlot => "Only the first entry of each slot kept to fit context",
        _ => "Slot share exceeded",
    };
    let stats = SectionStats {
        name: layer.into(),
        tokens: used,
        items_included: section.entries.len(),
        items_total: activated.len(),
    };
    (section, stats, maybe_drop(layer, dropped, dropped_tokens, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CharCountEstimator;
    use lorekeeper_core::knowledge::{ActivatedBy, KnowledgeEntry};

    fn activated(id: &str, position: Position, len: usize) -> ActivatedEntry {
        let entry = KnowledgeEntry::new(id, id, "");
        ActivatedEntry {
            position,
            order: 0,
            activated_by: ActivatedBy::Always,
            cascade_level: 0,
            rendered: id.chars().cycle().take(len).collect(),
            tokens: len,
            entry,
        }
    }

    fn render(
        list: &[ActivatedEntry],
        budget: usize,
        mode: WorldInfoMode,
    ) -> (WorldInfoSection, SectionStats, Option<DropInfo>) {
        render_world_info(list, budget, mode, &CharCountEstimator, "m")
    }

    #[test]
    fn empty_list_renders_nothing() {
        let (section, stats, drop) = render(&[], 100, WorldInfoMode::Budgeted);
        assert!(section.is_empty());
        assert_eq!(stats.items_total, 0);
        assert!(drop.is_none());
    }

    #[test]
    fn budget_split_evenly_across_slots() {
        let list = vec![
            activated("a", Position::BeforeChar, 30),
            activated("b", Position::BeforeChar, 30),
            activated("c", Position::AfterHistory, 30),
            activated("d", Position::AfterHistory, 30),
        ];
        // 120 / 2 slots = 60 each, both entries fit per slot.
        let (section, _, drop) = render(&list, 120, WorldInfoMode::Budgeted);
        assert_eq!(section.entries.len(), 4);
        assert!(drop.is_none());

        // 100 / 2 = 50 each, only the first of each slot fits.
        let (section, stats, drop) = render(&list, 100, WorldInfoMode::Budgeted);
        assert_eq!(section.slots[&Position::BeforeChar], "a".repeat(30));
        assert_eq!(section.slots[&Position::AfterHistory], "c".repeat(30));
        assert_eq!(stats.tokens, 60);
        assert_eq!(drop.unwrap().items_dropped, 2);
    }

    #[test]
    fn first_entry_always_kept() {
        let list = vec![activated("big", Position::AuthorsNote, 500)];
        let (section, stats, _) = render(&list, 10, WorldInfoMode::Budgeted);
        assert_eq!(section.entries.len(), 1);
        assert_eq!(stats.tokens, 500);
    }

    #[test]
    fn slot_stops_at_first_overflow() {
        let list = vec![
            activated("a", Position::AfterChar, 10),
            activated("b", Position::AfterChar, 50),
            activated("c", Position::AfterChar, 5),
        ];
        let (section, _, drop) = render(&list, 40, WorldInfoMode::Budgeted);
        assert_eq!(section.entries, vec!["a".repeat(10)]);
        assert_eq!(drop.unwrap().items_dropped, 2);
    }

    #[test]
    fn entries_joined_with_newlines() {
        let list = vec![
            activated("a", Position::BeforeChar, 2),
            activated("b", Position::BeforeChar, 2),
        ];
        let (section, _, _) = render(&list, 100, WorldInfoMode::Budgeted);
        assert_eq!(section.slots[&Position::BeforeChar], "aa\nbb");
    }

    #[test]
    fn fit_modes_shrink_output() {
        let list = vec![
            activated("a", Position::BeforeChar, 2),
            activated("b", Position::BeforeChar, 2),
        ];
        let (first, _, _) = render(&list, 100, WorldInfoMode::FirstPerSlot);
        assert_eq!(first.entries, vec!["aa"]);
        let (none, stats, drop) = render(&list, 100, WorldInfoMode::Omitted);
        assert!(none.is_empty());
        assert_eq!(stats.items_total, 2);
        assert_eq!(drop.unwrap().tokens_dropped, 4);
    }
}
