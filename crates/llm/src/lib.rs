//! Language-model client abstraction for Mnemo.
//!
//! The extraction and generation gateways both talk to a hosted model
//! through the [`LlmClient`] trait, so the core logic can be tested with
//! a deterministic fake. Providers: Gemini (the default) and any
//! OpenAI-compatible chat-completions endpoint.

pub mod client;
pub mod config;
pub mod gemini;
pub mod openai;

pub use client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
pub use config::{build_llm_client, LlmConfig, SemaphoredClient};
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
