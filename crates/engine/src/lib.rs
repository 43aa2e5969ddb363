//! Chat workflow orchestration for Mnemo.
//!
//! One conversational turn runs: retrieve the user's stored memory,
//! extract a fresh snapshot from the recent transcript, reconcile the
//! two through the merge engine, persist the freshly extracted delta,
//! and hand the merged view to the generation gateway as context.
//!
//! Gateway failures never surface to callers — extraction degrades to
//! an empty memory and generation to an apology string. Only storage
//! faults propagate.

pub mod config;
pub mod extractor;
pub mod personality;

use std::collections::HashMap;
use std::sync::Arc;

use mnemo_common::{ChatTurn, MnemoError, Result};
use mnemo_llm::{build_llm_client, LlmClient};
use mnemo_memory::{consolidate, merge, DurableMemoryStore, InMemoryStore, Memory, MemoryStore};
use tracing::debug;

pub use config::{EngineConfig, StoreConfig};
pub use extractor::{memory_summary, MemoryExtractor};
pub use personality::{personality, Personality, PersonalityEngine, PERSONALITIES};

/// Only the most recent turns feed extraction; older turns have already
/// been folded into stored memory by previous requests.
pub const EXTRACTION_WINDOW: usize = 30;

/// Result of one chat turn.
pub struct ChatOutcome {
    pub response: String,
    pub memory: Memory,
}

/// Result of an explicit extraction request.
pub struct ExtractOutcome {
    pub memory: Memory,
    pub summary: String,
}

/// Result of a personality comparison request.
pub struct CompareOutcome {
    pub comparisons: HashMap<String, String>,
    pub summary: String,
}

/// Orchestrates the extraction, merge, store, and generation steps.
pub struct Engine {
    store: Arc<dyn MemoryStore>,
    extractor: MemoryExtractor,
    personalities: PersonalityEngine,
    retrieve_limit: usize,
}

impl Engine {
    pub fn new(
        client: Arc<dyn LlmClient>,
        store: Arc<dyn MemoryStore>,
        retrieve_limit: usize,
    ) -> Self {
        Self {
            store,
            extractor: MemoryExtractor::new(client.clone()),
            personalities: PersonalityEngine::new(client),
            retrieve_limit,
        }
    }

    /// Build an engine from configuration: construct the model client
    /// and the selected store backend.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let client = build_llm_client(&config.provider)?;
        let store: Arc<dyn MemoryStore> = match config.store.backend.as_str() {
            "memory" => Arc::new(InMemoryStore::new()),
            "sqlite" => Arc::new(DurableMemoryStore::open(&config.store.db_path)?),
            other => {
                return Err(MnemoError::Config(format!(
                    "Unknown store backend: {other}"
                )));
            }
        };
        Ok(Self::new(client, store, config.store.retrieve_limit))
    }

    /// Run one chat turn: reconcile memory, persist the extracted
    /// delta, and generate a personality-styled reply from the merged
    /// view.
    pub async fn chat(
        &self,
        user_key: &str,
        transcript: &[ChatTurn],
        personality_key: &str,
    ) -> Result<ChatOutcome> {
        let retrieved = self.store.retrieve_all(user_key, self.retrieve_limit).await?;
        let existing = consolidate(&retrieved);

        let extracted = self.extractor.extract(recent_window(transcript)).await;
        let merged = merge(&existing, &extracted);

        debug!(
            user_key = %user_key,
            existing = existing.len(),
            extracted = extracted.len(),
            merged = merged.len(),
            "Reconciled memory for chat turn"
        );

        if !extracted.is_empty() {
            self.store.store(user_key, &extracted).await?;
        }

        let response = self
            .personalities
            .generate(transcript, personality_key, Some(&merged))
            .await;

        Ok(ChatOutcome { response, memory: merged })
    }

    /// Extract memory from a transcript and persist it.
    pub async fn extract_and_store(
        &self,
        user_key: &str,
        transcript: &[ChatTurn],
    ) -> Result<ExtractOutcome> {
        let extracted = self.extractor.extract(transcript).await;
        if !extracted.is_empty() {
            self.store.store(user_key, &extracted).await?;
        }
        let summary = memory_summary(&extracted);
        Ok(ExtractOutcome {
            memory: extracted,
            summary,
        })
    }

    /// Generate one reply per personality from the same merged memory.
    /// Nothing is persisted.
    pub async fn compare(
        &self,
        user_key: &str,
        transcript: &[ChatTurn],
    ) -> Result<CompareOutcome> {
        let retrieved = self.store.retrieve_all(user_key, self.retrieve_limit).await?;
        let existing = consolidate(&retrieved);

        let extracted = self.extractor.extract(recent_window(transcript)).await;
        let merged = merge(&existing, &extracted);

        let comparisons = self.personalities.compare(transcript, Some(&merged)).await;
        let summary = memory_summary(&merged);

        Ok(CompareOutcome {
            comparisons,
            summary,
        })
    }

    /// The user's stored memory, converged through the merge engine.
    pub async fn memory(&self, user_key: &str) -> Result<Memory> {
        let retrieved = self.store.retrieve_all(user_key, self.retrieve_limit).await?;
        Ok(consolidate(&retrieved))
    }

    /// Delete everything stored for a user.
    pub async fn forget(&self, user_key: &str) -> Result<()> {
        self.store.delete(user_key).await
    }
}

fn recent_window(transcript: &[ChatTurn]) -> &[ChatTurn] {
    let start = transcript.len().saturating_sub(EXTRACTION_WINDOW);
    &transcript[start..]
}
