//! `lorekeeper activate` — List the entries a scenario activates.

use crate::runtime::{Backend, Components, load_config};
use crate::scenario::Scenario;
use lorekeeper_core::knowledge::ActivatedEntry;
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
    let entries = backend
        .knowledge()
        .list_entries(&scenario.character.id)
        .await?;
    let history = backend.history().history(&scenario.chat_id).await?;
    let activated = components
        .engine(&backend)
        .activate(
            &scenario.chat_id,
            &entries,
            &scenario.message,
            &history,
            &components.activation,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&activated)?);
    } else {
        print_table(&activated);
    }
    Ok(())
}

fn print_table(activated: &[ActivatedEntry]) {
    if activated.is_empty() {
        println!("No entries activated.");
        return;
    }
    println!("{:>6}  {:<20} {:<10} {:<16} {:>6}", "ORDER", "ID", "BY", "POSITION", "TOKENS");
    for a in activated {
        let by = format!("{:?}", a.activated_by).to_lowercase();
        let by = if a.cascade_level > 0 {
            format!("{by}@{}", a.cascade_level)
        } else {
            by
        };
        println!(
            "{:>6}  {:<20} {:<10} {:<16} {:>6}",
            a.order,
            a.id(),
            by,
            a.position.template_key().trim_start_matches("wi_"),
            a.tokens
        );
    }
    let total: usize = activated.iter().map(|a| a.tokens).sum();
    println!("{} entries, {} tokens", activated.len(), total);
}
