//! Bounded per-conversation history (redb).

use crate::error::{Result, StoreError};
use crate::{ConversationKey, Turn};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const CONVERSATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("conversations");

/// Persisted record for one conversation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Oldest first.
    pub messages: Vec<Turn>,
    pub channel_id: u64,
    pub user_id: u64,
    pub updated_at: DateTime<Utc>,
}

/// Per-conversation memory as seen by the relay.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Turns for a key, oldest first. Empty when nothing is stored.
    async fn get_history(&self, key: ConversationKey) -> Result<Vec<Turn>>;

    /// Append one user turn and one assistant turn as a single update.
    async fn append_exchange(
        &self,
        key: ConversationKey,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()>;

    /// Forget a key. Returns whether anything was stored.
    async fn clear(&self, key: ConversationKey) -> Result<bool>;
}

#[async_trait]
impl ConversationMemory for ConversationStore {
    async fn get_history(&self, key: ConversationKey) -> Result<Vec<Turn>> {
        ConversationStore::get_history(self, key).await
    }

    async fn append_exchange(
        &self,
        key: ConversationKey,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        ConversationStore::append_exchange(self, key, user_text, assistant_text).await
    }

    async fn clear(&self, key: ConversationKey) -> Result<bool> {
        ConversationStore::clear(self, key).await
    }
}

/// Durable mapping from conversation key to its most recent turns.
///
/// Appends run their read-modify-write inside a single write transaction.
/// redb admits one writer at a time, so two exchanges landing on the same key
/// concurrently are applied one after the other and neither is lost. A failed
/// commit leaves the previous record untouched.
#[derive(Clone)]
pub struct ConversationStore {
    db: Arc<Database>,
    history_depth: usize,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("history_depth", &self.history_depth)
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path, history_depth: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_error)?;
        Self::with_database(Arc::new(db), history_depth)
    }

    /// Wrap an already opened database. Creates the table if needed.
    pub fn with_database(db: Arc<Database>, history_depth: usize) -> Result<Self> {
        let write_txn = db.begin_write().map_err(db_error)?;
        write_txn.open_table(CONVERSATIONS_TABLE).map_err(db_error)?;
        write_txn.commit().map_err(db_error)?;

        Ok(Self { db, history_depth })
    }

    /// Maximum number of turns kept per conversation.
    pub fn max_turns(&self) -> usize {
        self.history_depth * 2
    }

    /// Load the full record for a key, if one exists.
    pub async fn load(&self, key: ConversationKey) -> Result<Option<ConversationRecord>> {
        let db = self.db.clone();
        run_blocking(move || {
            let storage_key = key.storage_key();
            let read_txn = db.begin_read().map_err(db_error)?;
            let table = read_txn.open_table(CONVERSATIONS_TABLE).map_err(db_error)?;
            let record = match table.get(storage_key.as_str()).map_err(db_error)? {
                Some(value) => Some(decode(&storage_key, value.value())?),
                None => None,
            };
            Ok(record)
        })
        .await
    }

    /// Turns for a key, oldest first. Empty when nothing is stored.
    pub async fn get_history(&self, key: ConversationKey) -> Result<Vec<Turn>> {
        Ok(self
            .load(key)
            .await?
            .map(|record| record.messages)
            .unwrap_or_default())
    }

    /// Append a user turn and an assistant turn, then trim to the newest
    /// `2 × history_depth` turns.
    pub async fn append_exchange(
        &self,
        key: ConversationKey,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        let db = self.db.clone();
        let max_turns = self.max_turns();
        let new_turns = [Turn::user(user_text), Turn::assistant(assistant_text)];

        let stored = run_blocking(move || {
            let storage_key = key.storage_key();
            let write_txn = db.begin_write().map_err(db_error)?;
            let stored = {
                let mut table = write_txn.open_table(CONVERSATIONS_TABLE).map_err(db_error)?;
                let existing = match table.get(storage_key.as_str()).map_err(db_error)? {
                    Some(value) => decode(&storage_key, value.value())?.messages,
                    None => Vec::new(),
                };

                let mut messages = existing;
                messages.extend(new_turns);
                truncate_oldest(&mut messages, max_turns);

                let record = ConversationRecord {
                    messages,
                    channel_id: key.channel_id,
                    user_id: key.user_id,
                    updated_at: Utc::now(),
                };
                let encoded = serde_json::to_vec(&record).map_err(StoreError::Encode)?;
                table
                    .insert(storage_key.as_str(), encoded.as_slice())
                    .map_err(db_error)?;
                record.messages.len()
            };
            write_txn.commit().map_err(db_error)?;
            Ok(stored)
        })
        .await?;

        tracing::debug!(conversation = %key, turns = stored, "conversation updated");
        Ok(())
    }

    /// Delete the record for a key. Returns whether anything was deleted.
    pub async fn clear(&self, key: ConversationKey) -> Result<bool> {
        let db = self.db.clone();
        let removed = run_blocking(move || {
            let storage_key = key.storage_key();
            let write_txn = db.begin_write().map_err(db_error)?;
            let removed = {
                let mut table = write_txn.open_table(CONVERSATIONS_TABLE).map_err(db_error)?;
                let removed = table.remove(storage_key.as_str()).map_err(db_error)?;
                removed.is_some()
            };
            write_txn.commit().map_err(db_error)?;
            Ok(removed)
        })
        .await?;

        if removed {
            tracing::info!(conversation = %key, "conversation history cleared");
        }
        Ok(removed)
    }
}

/// Drop turns from the front until at most `max_turns` remain.
pub fn truncate_oldest(messages: &mut Vec<Turn>, max_turns: usize) {
    if messages.len() > max_turns {
        let excess = messages.len() - max_turns;
        messages.drain(..excess);
    }
}

fn decode(storage_key: &str, bytes: &[u8]) -> Result<ConversationRecord> {
    serde_json::from_slice(bytes).map_err(|source| {
        StoreError::Corrupt {
            key: storage_key.to_string(),
            source,
        }
        .into()
    })
}

fn db_error(error: impl Into<redb::Error>) -> crate::Error {
    StoreError::Database(error.into()).into()
}

/// Run a synchronous redb operation off the async runtime.
async fn run_blocking<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
}
