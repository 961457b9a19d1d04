//! Section budget allocation.
//!
//! | Section | With world info | Without |
//! |---------|-----------------|---------|
//! | Character core | 15% | 15% |
//! | World info | 25% | 5% |
//! | History | 50% | 70% |
//! | System / examples | 10% | 10% |

use serde::{Deserialize, Serialize};

/// Token shares for one build. Each share is `available * pct / 100`, floored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBudgets {
    /// `max_context_tokens - reserve_tokens`.
    pub available: usize,
    pub character: usize,
    pub world_info: usize,
    pub history: usize,
    pub system: usize,
}

impl SectionBudgets {
    pub fn allocate(max_context_tokens: usize, reserve_tokens: usize, has_world_info: bool) -> Self {
        let available = max_context_tokens.saturating_sub(reserve_tokens);
        let share = |pct: usize| available * pct / 100;
        let (world_info, history) = if has_world_info { (25, 50) } else { (5, 70) };
        Self {
            available,
            character: share(15),
            world_info: share(world_info),
            history: share(history),
            system: share(10),
        }
    }
}
