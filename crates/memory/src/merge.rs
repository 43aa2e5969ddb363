//! Deterministic reconciliation of two memory snapshots.
//!
//! `merge` folds a freshly extracted [`Memory`] into a previously stored
//! one, deduplicating per record kind by identity key:
//!
//! - **Preference**: keyed by `(category, lowercase(preference))`. The
//!   existing record survives a collision with its confidence raised to
//!   the maximum seen for that key.
//! - **EmotionalPattern**: keyed by `(lowercase(emotion),
//!   lowercase(context))`. Frequencies are summed on collision and
//!   trigger lists are unioned, existing triggers first.
//! - **Fact**: keyed by `lowercase(fact)`. The incoming record replaces
//!   the existing one in place when its importance is strictly higher.
//!
//! Existing records keep their positions; genuinely new records are
//! appended after them in incoming order. The function is pure and
//! total: it has no side effects and is defined for all well-formed
//! inputs.

use crate::types::{EmotionalPattern, Fact, Memory, Preference};
use std::collections::HashMap;
use std::hash::Hash;

/// Merge `incoming` into `existing`, returning the reconciled memory.
pub fn merge(existing: &Memory, incoming: &Memory) -> Memory {
    Memory {
        preferences: merge_preferences(&existing.preferences, &incoming.preferences),
        emotional_patterns: merge_patterns(&existing.emotional_patterns, &incoming.emotional_patterns),
        facts: merge_facts(&existing.facts, &incoming.facts),
    }
}

/// Collapse duplicate identity keys within a single snapshot by folding
/// each record through the merge engine one at a time.
///
/// The durable store adapter appends records without deduplicating, so a
/// retrieved snapshot may carry several entries for the same key; this
/// converges them the same way a sequence of merges would have.
pub fn consolidate(memory: &Memory) -> Memory {
    let mut merged = Memory::default();
    for pref in &memory.preferences {
        let single = Memory {
            preferences: vec![pref.clone()],
            ..Default::default()
        };
        merged = merge(&merged, &single);
    }
    for pattern in &memory.emotional_patterns {
        let single = Memory {
            emotional_patterns: vec![pattern.clone()],
            ..Default::default()
        };
        merged = merge(&merged, &single);
    }
    for fact in &memory.facts {
        let single = Memory {
            facts: vec![fact.clone()],
            ..Default::default()
        };
        merged = merge(&merged, &single);
    }
    merged
}

/// Positions of the first occurrence of each identity key in `existing`.
/// Built from the existing list only: keys first seen in `incoming` are
/// always appended, even if several incoming records share one.
fn key_index<T, K: Eq + Hash>(existing: &[T], key_of: impl Fn(&T) -> K) -> HashMap<K, usize> {
    let mut index = HashMap::with_capacity(existing.len());
    for (i, record) in existing.iter().enumerate() {
        index.entry(key_of(record)).or_insert(i);
    }
    index
}

fn merge_preferences(existing: &[Preference], incoming: &[Preference]) -> Vec<Preference> {
    let index = key_index(existing, Preference::identity_key);
    let mut merged = existing.to_vec();

    for pref in incoming {
        match index.get(&pref.identity_key()) {
            Some(&i) => {
                if pref.confidence > merged[i].confidence {
                    merged[i].confidence = pref.confidence;
                }
            }
            None => merged.push(pref.clone()),
        }
    }
    merged
}

fn merge_patterns(existing: &[EmotionalPattern], incoming: &[EmotionalPattern]) -> Vec<EmotionalPattern> {
    let index = key_index(existing, EmotionalPattern::identity_key);
    let mut merged = existing.to_vec();

    for pattern in incoming {
        match index.get(&pattern.identity_key()) {
            Some(&i) => {
                let slot = &mut merged[i];
                slot.frequency = slot.frequency.saturating_add(pattern.frequency);
                for trigger in &pattern.triggers {
                    let lowered = trigger.to_lowercase();
                    if !slot.triggers.iter().any(|t| t.to_lowercase() == lowered) {
                        slot.triggers.push(trigger.clone());
                    }
                }
            }
            None => merged.push(pattern.clone()),
        }
    }
    merged
}

fn merge_facts(existing: &[Fact], incoming: &[Fact]) -> Vec<Fact> {
    let index = key_index(existing, Fact::identity_key);
    let mut merged = existing.to_vec();

    for fact in incoming {
        match index.get(&fact.identity_key()) {
            Some(&i) => {
                if fact.importance > merged[i].importance {
                    merged[i] = fact.clone();
                }
            }
            None => merged.push(fact.clone()),
        }
    }
    merged
}
