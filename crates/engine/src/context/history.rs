//! History section: newest-first window with a placeholder for the rest.

use super::builder::{DropInfo, SectionStats, maybe_drop};
use crate::token;
use lorekeeper_core::capability::{Summarizer, TokenEstimator};
use lorekeeper_core::error::SummaryError;
use lorekeeper_core::message::{Message, Role};
use std::time::Duration;
use tracing::{debug, warn};

/// The most recent messages that fit a budget.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    /// Included `"Role: content"` lines, oldest first.
    pub lines: Vec<String>,
    /// Number of older messages left out.
    pub omitted: usize,
    /// Sum of the included lines' estimates.
    pub line_tokens: usize,
    /// Sum of the omitted lines' estimates.
    pub omitted_tokens: usize,
    pub total: usize,
}

impl HistoryWindow {
    /// Walk newest to oldest, stopping at the first message that does not fit.
    pub fn select(
        history: &[Message],
        budget: usize,
        estimator: &dyn TokenEstimator,
        model: &str,
    ) -> Self {
        let mut lines = Vec::new();
        let mut used = 0;
        let mut cut = 0;

        for (i, message) in history.iter().enumerate().rev() {
            let line = message.as_line();
            let tokens = token::estimate(estimator, &line, model);
            if used + tokens > budget {
                cut = i + 1;
                break;
            }
            used += tokens;
            lines.push(line);
        }
        lines.reverse();

        let omitted_tokens = history[..cut]
            .iter()
            .map(|m| token::estimate(estimator, &m.as_line(), model))
            .sum();

        Self {
            lines,
            omitted: cut,
            line_tokens: used,
            omitted_tokens,
            total: history.len(),
        }
    }

    /// Join the window under an optional placeholder line.
    pub fn render(&self, placeholder: Option<&str>) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.lines.len() + 1);
        if let Some(p) = placeholder {
            parts.push(p);
        }
        parts.extend(self.lines.iter().map(String::as_str));
        parts.join("\n")
    }

    /// Stats and drop info for a rendered window.
    pub fn stats(
        &self,
        rendered: &str,
        summarized: bool,
        estimator: &dyn TokenEstimator,
        model: &str,
    ) -> (SectionStats, Option<DropInfo>) {
        let layer = "history";
        let reason = if summarized {
            "Oldest messages replaced by a summary"
        } else {
            "Oldest messages replaced by a placeholder"
        };
        (
            SectionStats {
                name: layer.into(),
                tokens: token::estimate(estimator, rendered, model),
                items_included: self.lines.len(),
                items_total: self.total,
            },
            maybe_drop(layer, self.omitted, self.omitted_tokens, reason),
        )
    }
}

/// `"[Earlier conversation: N messages not shown]"`.
pub fn hidden_placeholder(omitted: usize) -> String {
    format!("[Earlier conversation: {omitted} messages not shown]")
}

/// `"[Earlier conversation (N messages): <summary>]"`.
pub fn summary_placeholder(omitted: usize, summary: &str) -> String {
    format!("[Earlier conversation ({omitted} messages): {summary}]")
}

/// Summary line held to `room` tokens.
///
/// Long summaries are clipped; when not even a clipped summary fits, the
/// hidden placeholder is used instead.
pub fn fit_summary_line(
    omitted: usize,
    summary: &str,
    room: usize,
    estimator: &dyn TokenEstimator,
    model: &str,
) -> String {
    let line = summary_placeholder(omitted, summary);
    if token::estimate(estimator, &line, model) <= room {
        return line;
    }

    let frame = token::estimate(estimator, &summary_placeholder(omitted, ""), model);
    let clipped = token::truncate_to_tokens(estimator, summary, room.saturating_sub(frame), model);
    let clipped = clipped.trim_end();
    if !clipped.is_empty() {
        let line = summary_placeholder(omitted, clipped);
        if token::estimate(estimator, &line, model) <= room {
            debug!(omitted, room, "Summary clipped to fit the history share");
            return line;
        }
    }
    debug!(omitted, room, "Summary does not fit, using placeholder");
    hidden_placeholder(omitted)
}

/// Count statistic used when no summary is available.
pub fn fallback_summary(messages: &[Message]) -> String {
    let user = messages.iter().filter(|m| m.role == Role::User).count();
    let assistant = messages.iter().filter(|m| m.role == Role::Assistant).count();
    format!(
        "{} messages exchanged ({user} user, {assistant} assistant)",
        messages.len()
    )
}

/// Summarize `messages` under `timeout`, falling back to the count statistic
/// when no summarizer is configured, the call fails or it times out.
pub async fn summarize_or_fallback(
    summarizer: Option<&dyn Summarizer>,
    messages: &[Message],
    timeout: Duration,
) -> String {
    let Some(summarizer) = summarizer else {
        debug!("No summarizer configured, using message statistics");
        return fallback_summary(messages);
    };

    let outcome = match tokio::time::timeout(timeout, summarizer.summarize(messages)).await {
        Ok(result) => result,
        Err(_) => Err(SummaryError::Timeout(timeout.as_secs())),
    };
    match outcome {
        Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
        Ok(_) => fallback_summary(messages),
        Err(e) => {
            warn!("History summary unavailable ({e}); using message statistics");
            fallback_summary(messages)
        }
    }
}
