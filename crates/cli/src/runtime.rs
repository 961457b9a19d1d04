//! Wiring shared by the commands: config, stores and engine components.

use crate::scenario::Scenario;
use lorekeeper_config::AppConfig;
use lorekeeper_core::capability::{TemplateRenderer, TokenEstimator};
use lorekeeper_core::store::{HistoryStore, KnowledgeStore};
use lorekeeper_engine::{
    ActivationEngine, ActivationOptions, ContextBuildOptions, ContextBuilder, HeuristicEstimator,
    PromptPipeline, TemplateEngine,
};
use lorekeeper_store::{InMemoryStore, SqliteStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load config from `path` (or the default location), apply env overrides
/// and validate.
pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}

/// The configured store backend.
#[derive(Clone)]
pub enum Backend {
    Memory(InMemoryStore),
    Sqlite(SqliteStore),
}

impl Backend {
    /// Open the backend named in config, or the SQLite file at `db`.
    pub async fn open(config: &AppConfig, db: Option<&Path>) -> CliResult<Self> {
        if let Some(path) = db {
            info!("Opening SQLite store at {}", path.display());
            return Ok(Self::Sqlite(SqliteStore::open(path).await?));
        }
        match config.store.backend.as_str() {
            "memory" => Ok(Self::Memory(InMemoryStore::new())),
            _ => {
                let path = config.store.database_path();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                info!("Opening SQLite store at {}", path.display());
                Ok(Self::Sqlite(SqliteStore::open(&path).await?))
            }
        }
    }

    pub fn knowledge(&self) -> Arc<dyn KnowledgeStore> {
        match self {
            Self::Memory(store) => Arc::new(store.clone()),
            Self::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        match self {
            Self::Memory(store) => Arc::new(store.clone()),
            Self::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    /// Upsert the scenario's entries. History is only written into an
    /// empty chat so re-running a scenario against a database is stable.
    pub async fn seed(&self, scenario: &Scenario) -> CliResult<()> {
        for entry in &scenario.entries {
            match self {
                Self::Memory(store) => store.upsert_entry(entry.clone()).await,
                Self::Sqlite(store) => store.upsert_entry(entry).await?,
            }
        }

        let history = self.history();
        if history.history(&scenario.chat_id).await?.is_empty() {
            for message in &scenario.history {
                history
                    .append_message(&scenario.chat_id, message.clone())
                    .await?;
            }
        } else {
            debug!(chat = %scenario.chat_id, "Chat already has history, not reseeding");
        }
        Ok(())
    }
}

/// Engine components built from config.
pub struct Components {
    pub estimator: Arc<dyn TokenEstimator>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub activation: ActivationOptions,
    pub context: ContextBuildOptions,
}

impl Components {
    pub fn from_config(config: &AppConfig, scenario: &Scenario) -> CliResult<Self> {
        let mut activation =
            ActivationOptions::from_config(&config.activation, config.default_model.clone());
        activation.now = scenario.now;
        Ok(Self {
            estimator: Arc::new(HeuristicEstimator),
            renderer: Arc::new(TemplateEngine::with_templates(&config.templates)?),
            activation,
            context: ContextBuildOptions::from_config(&config.context, config.default_model.clone()),
        })
    }

    pub fn engine(&self, backend: &Backend) -> ActivationEngine {
        ActivationEngine::new(backend.knowledge(), self.estimator.clone())
    }

    pub fn pipeline(&self, backend: &Backend) -> PromptPipeline {
        PromptPipeline::new(
            backend.knowledge(),
            backend.history(),
            self.engine(backend),
            ContextBuilder::new(self.estimator.clone(), self.renderer.clone()),
        )
    }
}
