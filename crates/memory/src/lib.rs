//! Per-user memory for Mnemo: record model, merge engine, and store
//! adapters.
//!
//! # Record kinds
//!
//! - **Preference**: something the user likes or dislikes, with a
//!   confidence score
//! - **EmotionalPattern**: a recurring emotional state with a frequency
//!   counter and triggers
//! - **Fact**: a standalone fact worth remembering, with an importance
//!   score
//!
//! # Architecture
//!
//! ```text
//! extraction gateway ──► Memory (fresh snapshot)
//!                              │
//!                              ▼
//!        stored Memory ──► merge::merge ──► reconciled Memory
//!                              ▲
//!                              │
//!               MemoryStore (InMemoryStore | DurableMemoryStore)
//! ```
//!
//! The merge engine is the single source of truth for what "the same
//! memory" means. The transient store pre-merges on write; the durable
//! store appends raw rows and leaves reconciliation to its callers.

pub mod durable;
pub mod merge;
pub mod store;
pub mod types;

pub use durable::DurableMemoryStore;
pub use merge::{consolidate, merge};
pub use store::{InMemoryStore, MemoryStore};
pub use types::{EmotionalPattern, Fact, Memory, Preference};
