//! Lorebook activation.
//!
//! Decides which knowledge entries are relevant to the current turn.
//!
//! | Step | Module |
//! |------|--------|
//! | Delay / sticky / cooldown gate | [`gate`] |
//! | Keyword and regex triggers | [`matcher`] |
//! | Cascade, sort, rate limit, record commit | [`engine`] |

pub mod engine;
pub mod gate;
pub mod matcher;

pub use engine::{ActivationEngine, ActivationOptions};
pub use gate::{GateState, gate};
