//! `lorekeeper build` — Render the prompt for one turn of a scenario.

use crate::runtime::{Backend, Components, load_config};
use crate::scenario::Scenario;
use lorekeeper_core::message::ChatId;
use lorekeeper_engine::{EntrySource, PreparedPrompt, PromptRequest};
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    scenario_path: &Path,
    db: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let scenario = Scenario::load(scenario_path)?;
    let backend = Backend::open(&config, db).await?;
    backend.seed(&scenario).await?;

    let components = Components::from_config(&config, &scenario)?;
    let pipeline = components.pipeline(&backend);
    let prepared = pipeline
        .prepare(
            PromptRequest {
                chat_id: ChatId::from(&scenario.chat_id),
                character: scenario.character.clone(),
                user_message: scenario.message.clone(),
                entries: EntrySource::Store,
            },
            &components.activation,
            &components.context,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&prepared))?);
    } else {
        print_report(&prepared);
    }
    Ok(())
}

fn to_json(prepared: &PreparedPrompt) -> serde_json::Value {
    serde_json::json!({
        "messages": prepared.messages(),
        "activated": prepared.activated,
        "components": prepared.context.components,
        "metadata": prepared.context.metadata,
    })
}

fn print_report(prepared: &PreparedPrompt) {
    let meta = &prepared.context.metadata;

    println!("── System ─────────────────────────────────────────");
    println!("{}", prepared.context.system_message());
    println!();
    println!("── User ───────────────────────────────────────────");
    if let Some(user) = prepared.messages().get(1) {
        println!("{}", user.content);
    }
    println!();
    println!("── Usage ──────────────────────────────────────────");
    println!(
        "  Tokens:     {} / {} ({:.1}%)",
        meta.total_tokens, meta.available_tokens, meta.utilization_pct
    );
    for section in &meta.per_section {
        println!(
            "  {:<12}{:>6} tokens  {}/{} items",
            section.name, section.tokens, section.items_included, section.items_total
        );
    }
    for drop in &meta.drops {
        println!(
            "  Dropped:    {} {} ({} tokens): {}",
            drop.items_dropped, drop.layer, drop.tokens_dropped, drop.reason
        );
    }
    if meta.over_budget {
        println!("  ⚠️  Prompt exceeds the context budget");
    }
    println!("  Activated:  {}", prepared.activated.len());
    for a in &prepared.activated {
        println!("    [{}] {} ({:?})", a.order, a.id(), a.activated_by);
    }
}
