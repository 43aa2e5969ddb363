use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mnemo_common::{MnemoError, Result};
use serde::{Deserialize, Serialize};

use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::gemini::GeminiClient;
use crate::openai::OpenAiClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider type: "gemini" or "openai"
    pub provider: String,

    /// Model name
    pub model: String,

    /// API key. If not set, resolved from the environment:
    /// GEMINI_API_KEY for Gemini, OPENAI_API_KEY for OpenAI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API endpoint (for OpenAI-compatible endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,

    /// Per-request timeout; expiry surfaces as an ordinary gateway
    /// failure.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

fn default_timeout() -> u64 {
    30_000
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: "gemini-2.5-flash".into(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: default_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment variables.
    ///
    /// Priority:
    /// 1. Explicit api_key in config
    /// 2. Environment variable based on provider:
    ///    - "gemini" -> GEMINI_API_KEY
    ///    - "openai" -> OPENAI_API_KEY
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }

        let env_var = match self.provider.as_str() {
            "gemini" => "GEMINI_API_KEY",
            "openai" => "OPENAI_API_KEY",
            _ => return None,
        };

        std::env::var(env_var).ok()
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent)),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| MnemoError::Gateway(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let timeout = Duration::from_millis(config.timeout_ms);

    let base_client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "gemini" => {
            let api_key = config
                .resolve_api_key()
                .ok_or_else(|| MnemoError::Config("Gemini requires an API key".to_string()))?;
            Arc::new(GeminiClient::new(config.model.clone(), api_key, timeout)?)
        }
        "openai" => Arc::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            config.resolve_api_key(),
            timeout,
        )?),
        other => {
            return Err(MnemoError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    let semaphored = SemaphoredClient::new(base_client, config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
provider = "openai"
model = "gpt-4o-mini"
api_url = "http://localhost:11434"
timeout_ms = 10000
max_concurrent_requests = 4
"#;

    #[test]
    fn deserialize_config_from_toml() {
        let config: LlmConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:11434"));
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.max_concurrent_requests, 4);
    }

    #[test]
    fn deserialize_config_defaults() {
        let toml_str = r#"
provider = "gemini"
model = "gemini-2.5-flash"
api_key = "test-key"
"#;
        let config: LlmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_concurrent_requests, 2);
    }

    #[test]
    fn build_gemini_client() {
        let config = LlmConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "gemini-2.5-flash");
    }

    #[test]
    fn build_openai_client_without_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            model: "llama3".to_string(),
            api_url: Some("http://localhost:11434".to_string()),
            ..Default::default()
        };
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "llama3");
    }

    #[test]
    fn build_unknown_provider_fails() {
        let config = LlmConfig {
            provider: "cohere".to_string(),
            model: "command".to_string(),
            ..Default::default()
        };
        assert!(build_llm_client(&config).is_err());
    }

    #[test]
    fn explicit_api_key_wins_over_environment() {
        let config = LlmConfig {
            api_key: Some("explicit".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("explicit"));
    }

    #[tokio::test]
    async fn semaphored_client_limits_concurrency() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingClient {
            concurrent: Arc<AtomicU32>,
            max_seen: Arc<AtomicU32>,
        }

        #[async_trait]
        impl LlmClient for CountingClient {
            async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
                let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    model: "test".to_string(),
                    usage: None,
                    finish_reason: None,
                })
            }
            fn model_name(&self) -> &str {
                "test"
            }
        }

        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let inner = Arc::new(CountingClient {
            concurrent: concurrent.clone(),
            max_seen: max_seen.clone(),
        });

        let semaphored = Arc::new(SemaphoredClient::new(inner, 2));

        let mut handles = vec![];
        for _ in 0..6 {
            let client = semaphored.clone();
            handles.push(tokio::spawn(async move {
                client.complete(LlmRequest::default()).await.unwrap();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        // Max concurrency should never exceed 2
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
