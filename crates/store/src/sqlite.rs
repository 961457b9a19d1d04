//! SQLite store.
//!
//! Uses a single SQLite database file with three tables:
//! - `knowledge_entries`: authored entries; list columns stored as JSON text
//! - `activation_records`: one row per activation event, newest wins
//! - `messages`: chat history in append order
//!
//! List columns are parsed leniently: a malformed value marks the entry with
//! a `load_error` instead of failing the whole listing.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use lorekeeper_core::error::StoreError;
use lorekeeper_core::knowledge::{ActivationRecord, KnowledgeEntry};
use lorekeeper_core::message::{Message, Role};
use lorekeeper_core::store::{HistoryStore, KnowledgeStore};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A SQLite-backed knowledge and history store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database from a connection string such as
    /// `sqlite://lorekeeper.sqlite`.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, url).await
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {label}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_entries (
                id                 TEXT PRIMARY KEY NOT NULL,
                character_id       TEXT NOT NULL,
                name               TEXT NOT NULL,
                content            TEXT NOT NULL,
                keys               TEXT NOT NULL DEFAULT '[]',
                secondary_keys     TEXT NOT NULL DEFAULT '[]',
                activation_type    TEXT NOT NULL DEFAULT 'keyword',
                position           TEXT NOT NULL DEFAULT 'before_char',
                insertion_order    INTEGER NOT NULL DEFAULT 0,
                enabled            INTEGER NOT NULL DEFAULT 1,
                recursive          INTEGER NOT NULL DEFAULT 0,
                cascade_trigger    TEXT NOT NULL DEFAULT '[]',
                recursive_level    INTEGER NOT NULL DEFAULT 0,
                sticky             INTEGER NOT NULL DEFAULT 0,
                cooldown           INTEGER NOT NULL DEFAULT 0,
                delay              INTEGER NOT NULL DEFAULT 0,
                token_budget       INTEGER,
                selective_logic    TEXT NOT NULL DEFAULT 'AND_ANY',
                regex              TEXT,
                min_activations    INTEGER NOT NULL DEFAULT 0,
                insertion_template TEXT,
                embedding          BLOB
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("knowledge_entries table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_character ON knowledge_entries(character_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("character index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activation_records (
                iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id       TEXT NOT NULL,
                chat_id        TEXT NOT NULL,
                activated_at   TEXT NOT NULL,
                expires_at     TEXT,
                cooldown_until TEXT,
                message_count  INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("activation_records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_lookup \
             ON activation_records(entry_id, chat_id, activated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("records index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid       INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id   TEXT NOT NULL,
                role      TEXT NOT NULL,
                content   TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Insert or replace an entry.
    pub async fn upsert_entry(&self, entry: &KnowledgeEntry) -> Result<(), StoreError> {
        let keys = to_json(&entry.keys)?;
        let secondary_keys = to_json(&entry.secondary_keys)?;
        let cascade_trigger = to_json(&entry.cascade_trigger)?;
        let activation_type = enum_text(&entry.activation_type)?;
        let position = enum_text(&entry.position)?;
        let selective_logic = enum_text(&entry.selective_logic)?;
        let embedding = entry.embedding.as_deref().map(embedding_to_blob);

        sqlx::query(
            r#"
            INSERT INTO knowledge_entries (
                id, character_id, name, content, keys, secondary_keys, activation_type,
                position, insertion_order, enabled, recursive, cascade_trigger,
                recursive_level, sticky, cooldown, delay, token_budget, selective_logic,
                regex, min_activations, insertion_template, embedding
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22)
            ON CONFLICT(id) DO UPDATE SET
                character_id = excluded.character_id,
                name = excluded.name,
                content = excluded.content,
                keys = excluded.keys,
                secondary_keys = excluded.secondary_keys,
                activation_type = excluded.activation_type,
                position = excluded.position,
                insertion_order = excluded.insertion_order,
                enabled = excluded.enabled,
                recursive = excluded.recursive,
                cascade_trigger = excluded.cascade_trigger,
                recursive_level = excluded.recursive_level,
                sticky = excluded.sticky,
                cooldown = excluded.cooldown,
                delay = excluded.delay,
                token_budget = excluded.token_budget,
                selective_logic = excluded.selective_logic,
                regex = excluded.regex,
                min_activations = excluded.min_activations,
                insertion_template = excluded.insertion_template,
                embedding = excluded.embedding
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.character_id)
        .bind(&entry.name)
        .bind(&entry.content)
        .bind(&keys)
        .bind(&secondary_keys)
        .bind(&activation_type)
        .bind(&position)
        .bind(entry.insertion_order)
        .bind(entry.enabled)
        .bind(entry.recursive)
        .bind(&cascade_trigger)
        .bind(i64::from(entry.recursive_level))
        .bind(i64::from(entry.sticky))
        .bind(i64::from(entry.cooldown))
        .bind(i64::from(entry.delay))
        .bind(entry.token_budget.map(|b| b as i64))
        .bind(&selective_logic)
        .bind(&entry.regex)
        .bind(entry.min_activations as i64)
        .bind(&entry.insertion_template)
        .bind(embedding.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT entry failed: {e}")))?;

        debug!("Stored knowledge entry {}", entry.id);
        Ok(())
    }

    /// Parse a `KnowledgeEntry` from a row. Malformed list or enum columns
    /// are collected into `load_error` rather than failing the row.
    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeEntry, StoreError> {
        let column = |name: &str, e: sqlx::Error| {
            StoreError::QueryFailed(format!("{name} column: {e}"))
        };

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let name: String = row.try_get("name").map_err(|e| column("name", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let mut entry = KnowledgeEntry::new(id, name, content);

        entry.character_id = row
            .try_get("character_id")
            .map_err(|e| column("character_id", e))?;

        let mut problems = Vec::new();

        let mut list = |field: &str| -> Result<Vec<String>, StoreError> {
            let raw: String = row.try_get(field).map_err(|e| column(field, e))?;
            Ok(KnowledgeEntry::parse_list(&raw).unwrap_or_else(|e| {
                problems.push(format!("{field}: {e}"));
                Vec::new()
            }))
        };
        entry.keys = list("keys")?;
        entry.secondary_keys = list("secondary_keys")?;
        entry.cascade_trigger = list("cascade_trigger")?;

        let text = |field: &str| -> Result<Option<String>, StoreError> {
            row.try_get(field).map_err(|e| column(field, e))
        };
        let activation_type = text("activation_type")?;
        let position = text("position")?;
        let selective_logic = text("selective_logic")?;

        match parse_enum(activation_type) {
            Ok(v) => entry.activation_type = v,
            Err(e) => problems.push(format!("activation_type: {e}")),
        }
        match parse_enum(position) {
            Ok(v) => entry.position = v,
            Err(e) => problems.push(format!("position: {e}")),
        }
        match parse_enum(selective_logic) {
            Ok(v) => entry.selective_logic = v,
            Err(e) => problems.push(format!("selective_logic: {e}")),
        }

        let int = |field: &str| -> Result<i64, StoreError> {
            row.try_get::<i64, _>(field).map_err(|e| column(field, e))
        };
        entry.insertion_order = int("insertion_order")?;
        entry.enabled = int("enabled")? != 0;
        entry.recursive = int("recursive")? != 0;
        entry.recursive_level = int("recursive_level")?.max(0) as u32;
        entry.sticky = int("sticky")?.max(0) as u32;
        entry.cooldown = int("cooldown")?.max(0) as u32;
        entry.delay = int("delay")?.max(0) as u32;
        entry.min_activations = int("min_activations")?.max(0) as usize;

        let token_budget: Option<i64> = row
            .try_get("token_budget")
            .map_err(|e| column("token_budget", e))?;
        entry.token_budget = token_budget.map(|b| b.max(0) as usize);

        entry.regex = row.try_get("regex").map_err(|e| column("regex", e))?;
        entry.insertion_template = row
            .try_get("insertion_template")
            .map_err(|e| column("insertion_template", e))?;

        let embedding: Option<Vec<u8>> = row
            .try_get("embedding")
            .map_err(|e| column("embedding", e))?;
        entry.embedding = embedding.map(|blob| {
            blob.chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()
        });

        if !problems.is_empty() {
            let reason = problems.join("; ");
            warn!("Knowledge entry {} has malformed columns: {reason}", entry.id);
            entry.load_error = Some(reason);
        }

        Ok(entry)
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ActivationRecord, StoreError> {
        let column = |name: &str, e: sqlx::Error| {
            StoreError::QueryFailed(format!("{name} column: {e}"))
        };
        let activated_at: String = row
            .try_get("activated_at")
            .map_err(|e| column("activated_at", e))?;
        let expires_at: Option<String> = row
            .try_get("expires_at")
            .map_err(|e| column("expires_at", e))?;
        let cooldown_until: Option<String> = row
            .try_get("cooldown_until")
            .map_err(|e| column("cooldown_until", e))?;
        let message_count: i64 = row
            .try_get("message_count")
            .map_err(|e| column("message_count", e))?;

        Ok(ActivationRecord {
            entry_id: row.try_get("entry_id").map_err(|e| column("entry_id", e))?,
            chat_id: row.try_get("chat_id").map_err(|e| column("chat_id", e))?,
            activated_at: parse_time(&activated_at)?,
            expires_at: expires_at.as_deref().map(parse_time).transpose()?,
            cooldown_until: cooldown_until.as_deref().map(parse_time).transpose()?,
            message_count_at_activation: message_count.max(0) as usize,
        })
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_entries(&self, character_id: &str) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM knowledge_entries WHERE character_id = ?1 ORDER BY rowid")
            .bind(character_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("List entries: {e}")))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn latest_activation_record(
        &self,
        entry_id: &str,
        chat_id: &str,
    ) -> Result<Option<ActivationRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM activation_records
            WHERE entry_id = ?1 AND chat_id = ?2
            ORDER BY activated_at DESC, iid DESC
            LIMIT 1
            "#,
        )
        .bind(entry_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Latest record: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn put_activation_records(
        &self,
        records: Vec<ActivationRecord>,
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO activation_records
                    (entry_id, chat_id, activated_at, expires_at, cooldown_until, message_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&record.entry_id)
            .bind(&record.chat_id)
            .bind(format_time(record.activated_at))
            .bind(record.expires_at.map(format_time))
            .bind(record.cooldown_until.map(format_time))
            .bind(record.message_count_at_activation as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT record failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!("Persisted {} activation records", records.len());
        Ok(())
    }

    async fn count_messages(&self, chat_id: &str) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE chat_id = ?1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt.max(0) as usize)
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn history(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query("SELECT role, content, timestamp FROM messages WHERE chat_id = ?1 ORDER BY iid")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("History: {e}")))?;

        rows.iter()
            .map(|row| -> Result<Message, StoreError> {
                let role: String = row
                    .try_get("role")
                    .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
                let content: String = row
                    .try_get("content")
                    .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
                let timestamp: String = row
                    .try_get("timestamp")
                    .map_err(|e| StoreError::QueryFailed(format!("timestamp column: {e}")))?;
                let role: Role = parse_enum(Some(role))
                    .map_err(|e| StoreError::QueryFailed(format!("role value: {e}")))?;
                Ok(Message {
                    role,
                    content,
                    timestamp: parse_time(&timestamp)?,
                })
            })
            .collect()
    }

    async fn append_message(&self, chat_id: &str, message: Message) -> Result<(), StoreError> {
        let role = enum_text(&message.role)?;
        sqlx::query("INSERT INTO messages (chat_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)")
            .bind(chat_id)
            .bind(&role)
            .bind(&message.content)
            .bind(format_time(message.timestamp))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("timestamp {raw:?}: {e}")))
}

fn to_json(list: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(list).map_err(|e| StoreError::Storage(format!("List serialization: {e}")))
}

/// The serde name of a unit enum variant (e.g. `"before_char"`).
fn enum_text<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(StoreError::Storage(format!("Unexpected enum encoding: {other}"))),
        Err(e) => Err(StoreError::Storage(format!("Enum serialization: {e}"))),
    }
}

fn parse_enum<T: DeserializeOwned>(raw: Option<String>) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::Value::String(raw.unwrap_or_default()))
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}
