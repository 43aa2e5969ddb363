//! SQLite-backed durable store adapter.
//!
//! Raw storage is append-only: each record of an incoming memory is
//! persisted as its own row, tagged with the owning user key, a kind
//! discriminator, and a serialized copy of the record. Point-updates are
//! deliberately avoided — the same logical fact may exist as multiple
//! rows over time, and `retrieve_all` does not deduplicate. Callers
//! converge toward a deduplicated view through the merge engine.
//!
//! Each row also carries a human-readable `doc_text` digest of the
//! record; that is the text a similarity index would embed if one were
//! attached to this table.

use crate::store::MemoryStore;
use crate::types::{EmotionalPattern, Fact, Memory, Preference};
use async_trait::async_trait;
use mnemo_common::{MnemoError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const KIND_PREFERENCE: &str = "preference";
const KIND_EMOTIONAL_PATTERN: &str = "emotional_pattern";
const KIND_FACT: &str = "fact";

pub struct DurableMemoryStore {
    conn: Mutex<Connection>,
    last_stamp: Mutex<u64>,
}

impl DurableMemoryStore {
    /// Open (or create) the backing database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::with_connection(conn)
    }

    /// Open a private in-process database. Used by tests and
    /// throwaway deployments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_entries (
                entry_id   TEXT PRIMARY KEY,
                owner_key  TEXT NOT NULL,
                kind       TEXT NOT NULL,
                doc_text   TEXT NOT NULL,
                data_json  TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memory_entries_owner
                ON memory_entries (owner_key);",
        )
        .map_err(storage_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
            last_stamp: Mutex::new(0),
        })
    }

    /// Microsecond timestamp used only for identifier uniqueness, never
    /// for ordering. Bumped past the previous value when two stores
    /// land in the same microsecond.
    fn next_timestamp(&self) -> u64 {
        let mut last = self.last_stamp.lock();
        let stamp = now_micros().max(*last + 1);
        *last = stamp;
        stamp
    }

    /// Number of stored rows for a user key.
    pub fn count(&self, user_key: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_entries WHERE owner_key = ?1",
                params![user_key],
                |row| row.get(0),
            )
            .map_err(storage_error)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl MemoryStore for DurableMemoryStore {
    async fn store(&self, user_key: &str, memory: &Memory) -> Result<()> {
        if memory.is_empty() {
            return Ok(());
        }

        let timestamp = self.next_timestamp();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_error)?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO memory_entries
                         (entry_id, owner_key, kind, doc_text, data_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(storage_error)?;

            for (idx, pref) in memory.preferences.iter().enumerate() {
                insert
                    .execute(params![
                        entry_id(user_key, KIND_PREFERENCE, timestamp, idx),
                        user_key,
                        KIND_PREFERENCE,
                        preference_doc_text(pref),
                        serde_json::to_string(pref)?,
                        timestamp as i64,
                    ])
                    .map_err(storage_error)?;
            }

            for (idx, pattern) in memory.emotional_patterns.iter().enumerate() {
                insert
                    .execute(params![
                        entry_id(user_key, KIND_EMOTIONAL_PATTERN, timestamp, idx),
                        user_key,
                        KIND_EMOTIONAL_PATTERN,
                        pattern_doc_text(pattern),
                        serde_json::to_string(pattern)?,
                        timestamp as i64,
                    ])
                    .map_err(storage_error)?;
            }

            for (idx, fact) in memory.facts.iter().enumerate() {
                insert
                    .execute(params![
                        entry_id(user_key, KIND_FACT, timestamp, idx),
                        user_key,
                        KIND_FACT,
                        fact_doc_text(fact),
                        serde_json::to_string(fact)?,
                        timestamp as i64,
                    ])
                    .map_err(storage_error)?;
            }
        }

        tx.commit().map_err(storage_error)?;

        debug!(
            user_key = %user_key,
            records = memory.len(),
            "Appended memory records"
        );
        Ok(())
    }

    async fn retrieve_all(&self, user_key: &str, limit: usize) -> Result<Memory> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT kind, data_json FROM memory_entries
                 WHERE owner_key = ?1
                 ORDER BY rowid ASC
                 LIMIT ?2",
            )
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![user_key, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(storage_error)?;

        let mut memory = Memory::default();
        for row in rows {
            let (kind, data_json) = row.map_err(storage_error)?;
            // A row that no longer parses is dropped, not fatal: the
            // rest of the snapshot is still usable.
            match kind.as_str() {
                KIND_PREFERENCE => match serde_json::from_str::<Preference>(&data_json) {
                    Ok(pref) => memory.preferences.push(pref),
                    Err(e) => warn!(error = %e, kind = %kind, "Dropping unparseable memory row"),
                },
                KIND_EMOTIONAL_PATTERN => {
                    match serde_json::from_str::<EmotionalPattern>(&data_json) {
                        Ok(pattern) => memory.emotional_patterns.push(pattern),
                        Err(e) => warn!(error = %e, kind = %kind, "Dropping unparseable memory row"),
                    }
                }
                KIND_FACT => match serde_json::from_str::<Fact>(&data_json) {
                    Ok(fact) => memory.facts.push(fact),
                    Err(e) => warn!(error = %e, kind = %kind, "Dropping unparseable memory row"),
                },
                other => warn!(kind = %other, "Dropping memory row with unknown kind"),
            }
        }

        Ok(memory)
    }

    async fn delete(&self, user_key: &str) -> Result<()> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM memory_entries WHERE owner_key = ?1",
                params![user_key],
            )
            .map_err(storage_error)?;
        debug!(user_key = %user_key, removed = removed, "Deleted memory rows");
        Ok(())
    }
}

fn entry_id(user_key: &str, kind: &str, timestamp: u64, idx: usize) -> String {
    format!("{user_key}_{kind}_{timestamp}_{idx}")
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

fn storage_error(e: rusqlite::Error) -> MnemoError {
    MnemoError::Storage(e.to_string())
}

fn preference_doc_text(pref: &Preference) -> String {
    format!(
        "User preference: {} in category {}. Confidence: {}",
        pref.preference(),
        pref.category(),
        pref.confidence()
    )
}

fn pattern_doc_text(pattern: &EmotionalPattern) -> String {
    let mut text = format!(
        "Emotional pattern: {} in context {}. Frequency: {}",
        pattern.emotion(),
        pattern.context(),
        pattern.frequency()
    );
    if !pattern.triggers().is_empty() {
        text.push_str(&format!(" Triggers: {}", pattern.triggers().join(", ")));
    }
    text
}

fn fact_doc_text(fact: &Fact) -> String {
    let mut text = format!(
        "Fact about user: {} in category {}. Importance: {}",
        fact.fact(),
        fact.category(),
        fact.importance()
    );
    if !fact.context().is_empty() {
        text.push_str(&format!(" Context: {}", fact.context()));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_memory() -> Memory {
        Memory {
            preferences: vec![Preference::new("music", "jazz", 0.8).unwrap()],
            emotional_patterns: vec![EmotionalPattern::new(
                "anxious",
                "work",
                2,
                vec!["deadlines".into()],
            )
            .unwrap()],
            facts: vec![Fact::new("has a dog named Max", "pets", 0.7, "chat").unwrap()],
        }
    }

    #[tokio::test]
    async fn retrieve_after_store_roundtrip() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        let memory = sample_memory();

        store.store("alice", &memory).await.unwrap();
        let retrieved = store.retrieve_all("alice", 10).await.unwrap();

        assert_eq!(retrieved, memory);
    }

    #[tokio::test]
    async fn storage_is_append_only() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        let memory = sample_memory();

        store.store("alice", &memory).await.unwrap();
        store.store("alice", &memory).await.unwrap();

        // No pre-merge: both snapshots exist as independent rows.
        assert_eq!(store.count("alice").unwrap(), 6);
        let retrieved = store.retrieve_all("alice", 10).await.unwrap();
        assert_eq!(retrieved.preferences.len(), 2);
    }

    #[tokio::test]
    async fn retrieve_honors_limit() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        store.store("alice", &sample_memory()).await.unwrap();

        let retrieved = store.retrieve_all("alice", 1).await.unwrap();
        assert_eq!(retrieved.len(), 1);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        store.store("alice", &sample_memory()).await.unwrap();

        let bob = store.retrieve_all("bob", 10).await.unwrap();
        assert!(bob.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_all_rows_for_user() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        store.store("alice", &sample_memory()).await.unwrap();
        store.store("bob", &sample_memory()).await.unwrap();

        store.delete("alice").await.unwrap();

        assert!(store.retrieve_all("alice", 10).await.unwrap().is_empty());
        assert_eq!(store.retrieve_all("bob", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_memory_stores_nothing() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        store.store("alice", &Memory::default()).await.unwrap();
        assert_eq!(store.count("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn entry_ids_carry_owner_kind_and_index() {
        let store = DurableMemoryStore::open_in_memory().unwrap();
        store.store("alice", &sample_memory()).await.unwrap();

        let conn = store.conn.lock();
        let mut stmt = conn
            .prepare("SELECT entry_id, kind FROM memory_entries ORDER BY rowid ASC")
            .unwrap();
        let ids: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(ids.len(), 3);
        for (entry_id, kind) in &ids {
            assert!(entry_id.starts_with(&format!("alice_{kind}_")));
            assert!(entry_id.ends_with("_0"));
        }
    }
}
