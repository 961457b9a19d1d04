//! `lorekeeper config` — Configuration management commands.

use crate::runtime::load_config;
use lorekeeper_config::AppConfig;
use std::path::Path;

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if config.activation.max_activated_entries == 0 {
                warnings.push("max_activated_entries = 0 disables all lore");
            }

            if config.context.enable_summary && config.context.summary_timeout_secs == 0 {
                warnings.push("Summaries enabled with a zero timeout always fall back");
            }

            if !config.templates.contains_key(&config.context.template)
                && !matches!(config.context.template.as_str(), "default" | "compact")
            {
                warnings.push("context.template names a template that is not defined");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:      {}", config.default_model);
            println!(
                "   Context:    {} tokens ({} reserved)",
                config.context.max_context_tokens, config.context.reserve_tokens
            );
            println!("   Template:   {}", config.context.template);
            println!("   Store:      {}", config.store.backend);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };
    println!("{}", path.display());
    Ok(())
}

pub async fn default() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", AppConfig::default_toml());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = lorekeeper_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }
}
