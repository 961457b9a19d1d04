//! Per-entry timing gate: delay, sticky and cooldown.
//!
//! ```text
//!            no record, count < delay
//!   (new) ─────────────────────────────▶ Delayed
//!     │
//!     ▼ fires
//!   Sticky ── now >= expires_at ──▶ Cooldown ── now >= cooldown_until ──▶ Idle
//! ```
//!
//! Both windows start at `activated_at`, so a cooldown shorter than the
//! sticky window is never observed.

use chrono::{DateTime, Utc};
use lorekeeper_core::knowledge::ActivationRecord;

/// Where an entry stands before trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Free to run trigger evaluation.
    Idle,
    /// Never fired and the chat is still shorter than the entry's delay.
    Delayed { remaining: usize },
    /// Sticky window open: force-activate without matching.
    Sticky { until: DateTime<Utc> },
    /// Cooling down: skip this turn even on a match.
    Cooldown { until: DateTime<Utc> },
}

impl GateState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Delayed { .. } => "delayed",
            Self::Sticky { .. } => "sticky",
            Self::Cooldown { .. } => "cooldown",
        }
    }
}

/// Compute the gate state from the latest record for (entry, chat).
pub fn gate(
    record: Option<&ActivationRecord>,
    now: DateTime<Utc>,
    delay: u32,
    message_count: usize,
) -> GateState {
    let Some(record) = record else {
        let delay = delay as usize;
        return if message_count < delay {
            GateState::Delayed {
                remaining: delay - message_count,
            }
        } else {
            GateState::Idle
        };
    };

    if let Some(until) = record.expires_at.filter(|until| now < *until) {
        return GateState::Sticky { until };
    }
    if let Some(until) = record.cooldown_until.filter(|until| now < *until) {
        return GateState::Cooldown { until };
    }
    GateState::Idle
}
