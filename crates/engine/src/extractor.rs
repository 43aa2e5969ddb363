//! Memory extraction gateway.
//!
//! Extraction is best-effort and must never block the surrounding
//! conversation: any model failure, missing JSON block, or parse error
//! yields an empty [`Memory`]. Individual records that fail validation
//! are dropped; the rest of the batch is kept.

use std::sync::Arc;
use std::sync::LazyLock;

use mnemo_common::ChatTurn;
use mnemo_llm::{LlmClient, LlmRequest};
use mnemo_memory::{EmotionalPattern, Fact, Memory, Preference};
use regex::Regex;
use tracing::warn;

const EXTRACTION_SYSTEM: &str = "You are an expert at analyzing conversations and \
extracting structured information about users. Always return valid JSON inside a \
```json fenced block.";

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json(.*?)```").expect("valid JSON block pattern")
});

/// Extracts structured memory from chat transcripts through a language
/// model.
pub struct MemoryExtractor {
    client: Arc<dyn LlmClient>,
}

impl MemoryExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Extract memory from a transcript. Infallible by contract: every
    /// failure mode degrades to an empty memory.
    pub async fn extract(&self, transcript: &[ChatTurn]) -> Memory {
        let request = LlmRequest {
            system_prompt: Some(EXTRACTION_SYSTEM.to_string()),
            messages: vec![ChatTurn::user(build_extraction_prompt(transcript))],
            temperature: None,
            max_tokens: None,
        };

        match self.client.complete(request).await {
            Ok(response) => parse_memory_response(&response.content),
            Err(e) => {
                warn!(error = %e, "Memory extraction call failed; returning empty memory");
                Memory::default()
            }
        }
    }
}

fn format_transcript(transcript: &[ChatTurn]) -> String {
    transcript
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str().to_uppercase(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_extraction_prompt(transcript: &[ChatTurn]) -> String {
    format!(
        r#"Analyze the following conversation and extract structured information about the user.

Conversation:
{conversation}

Extract the following information:

1. USER PREFERENCES:
   - Identify any preferences the user has expressed (likes, dislikes, interests, hobbies, etc.)
   - Include category (e.g., "food", "music", "work", "hobbies") and the specific preference
   - Rate confidence from 0.0 to 1.0

2. EMOTIONAL PATTERNS:
   - Identify emotional states expressed by the user (happy, stressed, anxious, excited, etc.)
   - Note the context in which these emotions appear
   - Identify potential triggers or patterns
   - Count frequency if emotions repeat

3. FACTS WORTH REMEMBERING:
   - Extract important facts about the user (name, location, job, relationships, goals, etc.)
   - Include context where the fact was mentioned
   - Rate importance from 0.0 to 1.0

Return the result as a JSON object with this exact structure:
{{
    "preferences": [
        {{"category": "string", "preference": "string", "confidence": 0.0-1.0}}
    ],
    "emotional_patterns": [
        {{"emotion": "string", "context": "string", "frequency": int, "triggers": ["string"]}}
    ],
    "facts": [
        {{"fact": "string", "category": "string", "importance": 0.0-1.0, "context": "string"}}
    ]
}}

Be thorough and extract all relevant information. If a category is empty, return an empty array."#,
        conversation = format_transcript(transcript)
    )
}

/// Locate the fenced JSON block in a model response and parse it into a
/// validated memory. Every failure path degrades to an empty memory.
fn parse_memory_response(text: &str) -> Memory {
    let Some(block) = JSON_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
    else {
        warn!("No fenced JSON block in extraction response");
        return Memory::default();
    };

    let value: serde_json::Value = match serde_json::from_str(&block) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Malformed JSON in extraction response");
            return Memory::default();
        }
    };

    memory_from_value(&value)
}

/// Build a memory from untyped JSON, record by record, dropping records
/// that fail validation.
fn memory_from_value(value: &serde_json::Value) -> Memory {
    let mut memory = Memory::default();
    let mut dropped = 0usize;

    for item in array_items(value, "preferences") {
        match serde_json::from_value::<Preference>(item.clone()) {
            Ok(pref) => memory.preferences.push(pref),
            Err(_) => dropped += 1,
        }
    }
    for item in array_items(value, "emotional_patterns") {
        match serde_json::from_value::<EmotionalPattern>(item.clone()) {
            Ok(pattern) => memory.emotional_patterns.push(pattern),
            Err(_) => dropped += 1,
        }
    }
    for item in array_items(value, "facts") {
        match serde_json::from_value::<Fact>(item.clone()) {
            Ok(fact) => memory.facts.push(fact),
            Err(_) => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(dropped = dropped, "Dropped invalid records from extraction response");
    }
    memory
}

fn array_items<'a>(value: &'a serde_json::Value, key: &str) -> &'a [serde_json::Value] {
    value
        .get(key)
        .and_then(serde_json::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Render a human-readable summary of a memory.
pub fn memory_summary(memory: &Memory) -> String {
    let mut parts = Vec::new();

    if !memory.preferences.is_empty() {
        parts.push("PREFERENCES:".to_string());
        for pref in &memory.preferences {
            parts.push(format!(
                "  - {}: {} (confidence: {:.2})",
                pref.category(),
                pref.preference(),
                pref.confidence()
            ));
        }
    }

    if !memory.emotional_patterns.is_empty() {
        parts.push("\nEMOTIONAL PATTERNS:".to_string());
        for pattern in &memory.emotional_patterns {
            parts.push(format!(
                "  - {}: {} (frequency: {})",
                pattern.emotion(),
                pattern.context(),
                pattern.frequency()
            ));
            if !pattern.triggers().is_empty() {
                parts.push(format!("    Triggers: {}", pattern.triggers().join(", ")));
            }
        }
    }

    if !memory.facts.is_empty() {
        parts.push("\nFACTS:".to_string());
        for fact in &memory.facts {
            parts.push(format!(
                "  - {} ({}, importance: {:.2})",
                fact.fact(),
                fact.category(),
                fact.importance()
            ));
        }
    }

    if parts.is_empty() {
        "No memory extracted yet.".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_common::{MnemoError, Result};
    use mnemo_llm::LlmResponse;

    struct CannedClient {
        response: Option<String>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            match &self.response {
                Some(text) => Ok(LlmResponse {
                    content: text.clone(),
                    model: "fake".to_string(),
                    usage: None,
                    finish_reason: None,
                }),
                None => Err(MnemoError::Gateway("model unavailable".into())),
            }
        }
        fn model_name(&self) -> &str {
            "fake"
        }
    }

    fn extractor_with(response: Option<&str>) -> MemoryExtractor {
        MemoryExtractor::new(Arc::new(CannedClient {
            response: response.map(str::to_string),
        }))
    }

    const VALID_RESPONSE: &str = r#"Here is what I found:
```json
{
    "preferences": [{"category": "music", "preference": "jazz", "confidence": 0.8}],
    "emotional_patterns": [{"emotion": "anxious", "context": "work", "frequency": 2, "triggers": ["deadlines"]}],
    "facts": [{"fact": "has a dog named Max", "category": "pets", "importance": 0.7, "context": "chat"}]
}
```"#;

    #[tokio::test]
    async fn extracts_all_record_kinds() {
        let extractor = extractor_with(Some(VALID_RESPONSE));
        let memory = extractor.extract(&[ChatTurn::user("I love jazz")]).await;

        assert_eq!(memory.preferences.len(), 1);
        assert_eq!(memory.preferences[0].preference(), "jazz");
        assert_eq!(memory.emotional_patterns.len(), 1);
        assert_eq!(memory.emotional_patterns[0].frequency(), 2);
        assert_eq!(memory.facts.len(), 1);
        assert_eq!(memory.facts[0].importance(), 0.7);
    }

    #[tokio::test]
    async fn gateway_failure_yields_empty_memory() {
        let extractor = extractor_with(None);
        let memory = extractor.extract(&[ChatTurn::user("hello")]).await;
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn missing_json_block_yields_empty_memory() {
        let extractor = extractor_with(Some("I could not find anything of note."));
        let memory = extractor.extract(&[ChatTurn::user("hello")]).await;
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_yields_empty_memory() {
        let extractor = extractor_with(Some("```json\n{not valid json\n```"));
        let memory = extractor.extract(&[ChatTurn::user("hello")]).await;
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn invalid_records_are_dropped_valid_ones_kept() {
        let response = r#"```json
{
    "preferences": [
        {"category": "music", "preference": "jazz", "confidence": 5.0},
        {"category": "food", "preference": "sushi", "confidence": 0.9}
    ],
    "facts": [{"fact": "", "category": "x", "importance": 0.3, "context": ""}]
}
```"#;
        let extractor = extractor_with(Some(response));
        let memory = extractor.extract(&[ChatTurn::user("hello")]).await;

        assert_eq!(memory.preferences.len(), 1);
        assert_eq!(memory.preferences[0].preference(), "sushi");
        assert!(memory.facts.is_empty());
    }

    #[test]
    fn missing_sections_parse_as_empty() {
        let memory = parse_memory_response("```json\n{\"preferences\": []}\n```");
        assert!(memory.is_empty());
    }

    #[test]
    fn transcript_formatting_uppercases_roles() {
        let transcript = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let formatted = format_transcript(&transcript);
        assert_eq!(formatted, "USER: hi\nASSISTANT: hello");
    }

    #[test]
    fn summary_renders_all_sections() {
        let memory = Memory {
            preferences: vec![Preference::new("music", "jazz", 0.8).unwrap()],
            emotional_patterns: vec![EmotionalPattern::new(
                "anxious",
                "work",
                2,
                vec!["deadlines".into()],
            )
            .unwrap()],
            facts: vec![Fact::new("has a dog", "pets", 0.7, "").unwrap()],
        };

        let summary = memory_summary(&memory);
        assert!(summary.contains("PREFERENCES:"));
        assert!(summary.contains("music: jazz (confidence: 0.80)"));
        assert!(summary.contains("EMOTIONAL PATTERNS:"));
        assert!(summary.contains("Triggers: deadlines"));
        assert!(summary.contains("FACTS:"));
        assert!(summary.contains("has a dog (pets, importance: 0.70)"));
    }

    #[test]
    fn summary_of_empty_memory() {
        assert_eq!(memory_summary(&Memory::default()), "No memory extracted yet.");
    }
}
