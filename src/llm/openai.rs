//! OpenAI-compatible chat-completions adapter. Also backs vLLM when served
//! through an OpenAI-compatible endpoint.

use std::time::Duration;

use async_trait::async_trait;

use super::{LlmError, LlmProvider, LlmResponse, LlmResult, ModelCapability, ModelInfo};
use crate::{config::ProviderConfig, context::GenerationContext};

pub struct OpenAiProvider {
   client: reqwest::Client,
   config: ProviderConfig,
   provider_name: String,
}

impl OpenAiProvider {
   pub fn new(provider_name: impl Into<String>, config: ProviderConfig) -> LlmResult<Self> {
      if config.api_key.is_none() {
         return Err(LlmError::Configuration("openai provider requires api_key".to_string()));
      }
      Self::new_unchecked(provider_name, config)
   }

   /// Builds the client without requiring `api_key`, for adapters (vLLM)
   /// that serve an OpenAI-compatible API but authenticate differently.
   pub(super) fn new_unchecked(provider_name: impl Into<String>, config: ProviderConfig) -> LlmResult<Self> {
      let client = reqwest::Client::builder()
         .timeout(Duration::from_secs(config.timeout_secs))
         .build()
         .map_err(|e| LlmError::Configuration(e.to_string()))?;
      Ok(Self { client, config, provider_name: provider_name.into() })
   }

   fn base_url(&self) -> &str {
      self.config.api_base.as_deref().unwrap_or("https://api.openai.com/v1")
   }

   pub(super) fn enabled(&self) -> bool {
      self.config.enabled
   }

   pub(super) fn config_ref(&self) -> &ProviderConfig {
      &self.config
   }

   /// o1/o3-family models take `max_completion_tokens`; everything else
   /// takes `max_tokens`.
   fn max_tokens_field(&self) -> &'static str {
      if self.config.model.starts_with('o') { "max_completion_tokens" } else { "max_tokens" }
   }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
   async fn generate(&self, _context: &GenerationContext, prompt: &str) -> LlmResult<LlmResponse> {
      let mut body = serde_json::json!({
         "model": self.config.model,
         "messages": [{"role": "user", "content": prompt}],
         "temperature": self.config.temperature,
         "response_format": {"type": "text"},
      });
      body[self.max_tokens_field()] = serde_json::json!(self.config.max_tokens);

      let resp = self
         .client
         .post(format!("{}/chat/completions", self.base_url()))
         .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
         .json(&body)
         .send()
         .await
         .map_err(|e| LlmError::Connection(e.to_string()))?;

      let status = resp.status();
      if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
         return Err(LlmError::RateLimit(format!("HTTP {status}")));
      }
      if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
         return Err(LlmError::Authentication(format!("HTTP {status}")));
      }
      if !status.is_success() {
         let text = resp.text().await.unwrap_or_default();
         return Err(LlmError::Generation(format!("HTTP {status}: {text}")));
      }

      let payload: serde_json::Value =
         resp.json().await.map_err(|e| LlmError::Generation(e.to_string()))?;

      let content = payload["choices"][0]["message"]["content"]
         .as_str()
         .ok_or_else(|| LlmError::Generation("empty response content".to_string()))?
         .to_string();

      let tokens_used = payload["usage"]["total_tokens"].as_u64().map(|n| n as u32);
      let finish_reason = payload["choices"][0]["finish_reason"].as_str().map(str::to_string);

      Ok(LlmResponse {
         content,
         tokens_used,
         cost_estimate: tokens_used.map(|t| self.estimate_cost(t)),
         model_used: self.config.model.clone(),
         finish_reason,
         metadata: serde_json::json!({"provider": self.provider_name}),
      })
   }

   fn is_available(&self) -> bool {
      self.config.enabled && self.config.api_key.is_some()
   }

   async fn validate_connection(&self) -> bool {
      self
         .client
         .get(format!("{}/models", self.base_url()))
         .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
         .send()
         .await
         .is_ok_and(|r| r.status().is_success())
   }

   fn model_info(&self) -> ModelInfo {
      ModelInfo {
         name: self.config.model.clone(),
         provider: self.provider_name.clone(),
         max_tokens: self.config.max_tokens,
         context_window: 128_000,
         capabilities: vec![
            ModelCapability::TextGeneration,
            ModelCapability::CodeGeneration,
            ModelCapability::StructuredOutput,
         ],
         cost_per_1k_tokens: Some(0.0005),
         supports_streaming: true,
      }
   }
}
