use async_trait::async_trait;
use mnemo_common::{ChatTurn, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// A blocking, single-attempt call to a hosted language model.
///
/// No retry semantics: a failed call is reported once and the caller
/// decides what a failure means (empty memory for extraction, an
/// apology string for generation).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_common::MessageRole;

    #[test]
    fn llm_request_serialization_roundtrip() {
        let request = LlmRequest {
            system_prompt: Some("You are helpful.".to_string()),
            messages: vec![ChatTurn::user("Hi")],
            temperature: Some(0.7),
            max_tokens: Some(1024),
        };
        let json = serde_json::to_string(&request).unwrap();
        let deserialized: LlmRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(
            deserialized.system_prompt.as_deref(),
            Some("You are helpful.")
        );
        assert_eq!(deserialized.messages.len(), 1);
        assert_eq!(deserialized.messages[0].role, MessageRole::User);
        assert_eq!(deserialized.temperature, Some(0.7));
        assert_eq!(deserialized.max_tokens, Some(1024));
    }

    #[test]
    fn llm_response_serialization_roundtrip() {
        let response = LlmResponse {
            content: "Hello there!".to_string(),
            model: "gemini-2.5-flash".to_string(),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
            finish_reason: Some("STOP".to_string()),
        };
        let json = serde_json::to_string(&response).unwrap();
        let deserialized: LlmResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Hello there!");
        assert_eq!(deserialized.model, "gemini-2.5-flash");
        let usage = deserialized.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(deserialized.finish_reason.as_deref(), Some("STOP"));
    }
}
