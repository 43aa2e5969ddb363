use std::time::Duration;

use async_trait::async_trait;
use mnemo_common::MessageRole;
use mnemo_common::MnemoError;
use mnemo_common::Result;
use serde::{Deserialize, Serialize};

use crate::client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

pub struct GeminiClient {
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(model: String, api_key: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MnemoError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            model,
            api_key,
            http_client,
        })
    }

    fn role_to_string(role: &MessageRole) -> &'static str {
        match role {
            // System turns go in the top-level systemInstruction field
            MessageRole::System => "user",
            MessageRole::User => "user",
            MessageRole::Assistant => "model",
        }
    }

    fn build_contents(request: &LlmRequest) -> Vec<GeminiContent> {
        request
            .messages
            .iter()
            .filter(|msg| msg.role != MessageRole::System)
            .map(|msg| GeminiContent {
                role: Self::role_to_string(&msg.role).to_string(),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            })
            .collect()
    }

    fn build_request_body(&self, request: &LlmRequest) -> GeminiRequest {
        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GeminiRequest {
            contents: Self::build_contents(request),
            system_instruction: request.system_prompt.as_ref().map(|s| {
                GeminiSystemInstruction {
                    parts: vec![GeminiPart { text: s.clone() }],
                }
            }),
            generation_config,
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model);
        let body = self.build_request_body(&request);

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MnemoError::Gateway(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(MnemoError::Gateway(format!(
                "Gemini API error {status}: {body_text}"
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| MnemoError::Gateway(format!("Failed to parse Gemini response: {e}")))?;

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| MnemoError::Gateway("No candidates in Gemini response".to_string()))?;

        let content = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage: gemini_response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                completion_tokens: u.candidates_token_count.unwrap_or(0),
            }),
            finish_reason: candidate.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_common::ChatTurn;

    fn test_client() -> GeminiClient {
        GeminiClient::new(
            "gemini-2.5-flash".to_string(),
            "test-key".to_string(),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn request_body_matches_gemini_format() {
        let client = test_client();
        let request = LlmRequest {
            system_prompt: Some("Be helpful.".to_string()),
            messages: vec![
                ChatTurn::user("Hello"),
                ChatTurn::assistant("Hi there!"),
                ChatTurn::user("How are you?"),
            ],
            temperature: Some(0.7),
            max_tokens: Some(1024),
        };

        let body = client.build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be helpful.");
        let temp = json["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 0.001);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Hello");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
    }

    #[test]
    fn system_turns_are_hoisted_not_inlined() {
        let client = test_client();
        let request = LlmRequest {
            system_prompt: Some("System instruction".to_string()),
            messages: vec![ChatTurn::system("inline system"), ChatTurn::user("Hello")],
            temperature: None,
            max_tokens: None,
        };

        let body = client.build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "System instruction"
        );

        // Inline system turns are filtered; only user/model roles remain.
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
    }

    #[test]
    fn generation_config_omitted_when_unset() {
        let client = test_client();
        let request = LlmRequest {
            system_prompt: None,
            messages: vec![ChatTurn::user("Hello")],
            temperature: None,
            max_tokens: None,
        };

        let body = client.build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert!(json.get("systemInstruction").is_none());
    }
}
