//! Per-user memory persistence.

use crate::merge::merge;
use crate::types::Memory;
use async_trait::async_trait;
use mnemo_common::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable per-user memory storage.
///
/// Implementations own the stored memory for a user key; callers always
/// receive owned values, never aliases into storage. Reconciliation
/// semantics are delegated to the merge engine — either internally on
/// `store` (transient variant) or by the caller after `retrieve_all`
/// (durable variant).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Record `memory` for `user_key`.
    async fn store(&self, user_key: &str, memory: &Memory) -> Result<()>;

    /// Fetch up to `limit` stored records for `user_key`, bundled into a
    /// single memory. Returns an empty memory for unknown users.
    async fn retrieve_all(&self, user_key: &str, limit: usize) -> Result<Memory>;

    /// Remove everything stored for `user_key`.
    async fn delete(&self, user_key: &str) -> Result<()>;
}

/// In-process store for deployments without durable storage.
///
/// State is kept pre-merged: every `store` folds the incoming memory
/// into the current value through the merge engine, so `retrieve_all`
/// never returns duplicate identity keys. The limit parameter is
/// ignored — the whole value is returned.
#[derive(Default)]
pub struct InMemoryStore {
    memories: RwLock<HashMap<String, Memory>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, user_key: &str, memory: &Memory) -> Result<()> {
        let mut memories = self.memories.write().await;
        let existing = memories.get(user_key).cloned().unwrap_or_default();
        let merged = merge(&existing, memory);

        debug!(
            user_key = %user_key,
            records = merged.len(),
            "Stored merged memory"
        );

        memories.insert(user_key.to_string(), merged);
        Ok(())
    }

    async fn retrieve_all(&self, user_key: &str, _limit: usize) -> Result<Memory> {
        let memories = self.memories.read().await;
        Ok(memories.get(user_key).cloned().unwrap_or_default())
    }

    async fn delete(&self, user_key: &str) -> Result<()> {
        let mut memories = self.memories.write().await;
        memories.remove(user_key);
        debug!(user_key = %user_key, "Deleted stored memory");
        Ok(())
    }
}
