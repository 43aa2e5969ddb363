//! Personality styles and the reply-generation gateway.
//!
//! Generation never raises: a model failure yields a user-visible
//! apology string embedding the error detail.

use std::collections::HashMap;
use std::sync::Arc;

use mnemo_common::ChatTurn;
use mnemo_llm::{LlmClient, LlmRequest};
use mnemo_memory::Memory;
use tracing::warn;

/// How many items of each kind are rendered into the memory digest.
const MAX_PREFERENCES: usize = 5;
const MAX_PATTERNS: usize = 3;
const MAX_FACTS: usize = 5;

/// Facts below this importance are left out of the digest.
const FACT_IMPORTANCE_FLOOR: f64 = 0.5;

/// A reply style the assistant can adopt.
#[derive(Debug, Clone, Copy)]
pub struct Personality {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
}

pub const PERSONALITIES: [Personality; 4] = [
    Personality {
        key: "default",
        name: "Default",
        description: "Standard helpful assistant",
        system_prompt: "You are a helpful, friendly AI assistant.",
    },
    Personality {
        key: "calm_mentor",
        name: "Calm Mentor",
        description: "A wise, patient guide who offers thoughtful advice",
        system_prompt: "You are a calm, wise, and patient mentor. Your communication style is:
- Thoughtful and reflective
- Encouraging but realistic
- Uses analogies and gentle guidance
- Maintains a calm, steady tone even when discussing difficult topics
- Asks probing questions to help the user think deeper
- Provides balanced perspectives
- Never judgmental, always supportive
- Keep the conversation concise and only respond with more words if necessary",
    },
    Personality {
        key: "witty_friend",
        name: "Witty Friend",
        description: "A fun, humorous companion who keeps things light",
        system_prompt: "You are a witty, humorous, and engaging friend. Your communication style is:
- Light-hearted and fun
- Uses humor and wit appropriately
- Casual and conversational
- Makes jokes and references that feel natural
- Energetic and enthusiastic
- Relatable and down-to-earth
- Still supportive, but with a playful edge
- Keep the conversation concise and only respond with more words if necessary",
    },
    Personality {
        key: "therapist",
        name: "Therapist",
        description: "A professional, empathetic guide for emotional support",
        system_prompt: "You are a professional, empathetic therapist. Your communication style is:
- Warm and non-judgmental
- Uses active listening techniques
- Asks open-ended questions
- Validates emotions
- Helps users explore their feelings
- Maintains professional boundaries
- Focuses on emotional well-being and self-discovery
- Uses therapeutic techniques like reflection and reframing
- Keep the conversation concise and only respond with more words if necessary",
    },
];

/// Look up a personality by key. Unknown keys fall back to `default`.
pub fn personality(key: &str) -> &'static Personality {
    PERSONALITIES
        .iter()
        .find(|p| p.key == key)
        .unwrap_or(&PERSONALITIES[0])
}

/// Generates personality-styled replies informed by stored memory.
pub struct PersonalityEngine {
    client: Arc<dyn LlmClient>,
}

impl PersonalityEngine {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Generate a reply in the given personality. Never fails: a model
    /// error becomes an apology string.
    pub async fn generate(
        &self,
        transcript: &[ChatTurn],
        personality_key: &str,
        memory: Option<&Memory>,
    ) -> String {
        let style = personality(personality_key);
        let mut system_prompt = style.system_prompt.to_string();

        if let Some(memory) = memory {
            let memory_context = build_memory_context(memory);
            system_prompt.push_str(&format!(
                "\n\nIMPORTANT CONTEXT ABOUT THE USER:\n{memory_context}\n\n\
                 Use this information to personalize your responses while \
                 maintaining your personality style."
            ));
        }

        let request = LlmRequest {
            system_prompt: Some(system_prompt),
            messages: transcript.to_vec(),
            temperature: None,
            max_tokens: None,
        };

        match self.client.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(error = %e, personality = style.key, "Reply generation failed");
                format!("I apologize, but I encountered an error: {e}")
            }
        }
    }

    /// Generate one reply per personality for side-by-side comparison.
    pub async fn compare(
        &self,
        transcript: &[ChatTurn],
        memory: Option<&Memory>,
    ) -> HashMap<String, String> {
        let mut comparisons = HashMap::new();
        for style in &PERSONALITIES {
            let response = self.generate(transcript, style.key, memory).await;
            comparisons.insert(style.key.to_string(), response);
        }
        comparisons
    }
}

/// Render the highest-signal memory items into a context digest.
fn build_memory_context(memory: &Memory) -> String {
    let mut parts = Vec::new();

    if !memory.preferences.is_empty() {
        let prefs = memory
            .preferences
            .iter()
            .take(MAX_PREFERENCES)
            .map(|p| format!("{} ({})", p.preference(), p.category()))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("Preferences: {prefs}"));
    }

    if !memory.emotional_patterns.is_empty() {
        let emotions = memory
            .emotional_patterns
            .iter()
            .take(MAX_PATTERNS)
            .map(|p| p.emotion().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("Emotional patterns: {emotions}"));
    }

    if !memory.facts.is_empty() {
        let facts = memory
            .facts
            .iter()
            .filter(|f| f.importance() > FACT_IMPORTANCE_FLOOR)
            .take(MAX_FACTS)
            .map(|f| f.fact().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        if !facts.is_empty() {
            parts.push(format!("Important facts: {facts}"));
        }
    }

    if parts.is_empty() {
        "No specific context available yet.".to_string()
    } else {
        parts.join("\n")
    }
}
