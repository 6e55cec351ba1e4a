use std::time::Duration;

use async_trait::async_trait;

use super::{LlmError, LlmProvider, LlmResponse, LlmResult, ModelCapability, ModelInfo};
use crate::{config::ProviderConfig, context::GenerationContext};

pub struct AnthropicProvider {
   client: reqwest::Client,
   config: ProviderConfig,
   provider_name: String,
}

impl AnthropicProvider {
   pub fn new(provider_name: impl Into<String>, config: ProviderConfig) -> LlmResult<Self> {
      if config.api_key.is_none() {
         return Err(LlmError::Configuration("anthropic provider requires api_key".to_string()));
      }
      let client = reqwest::Client::builder()
         .timeout(Duration::from_secs(config.timeout_secs))
         .build()
         .map_err(|e| LlmError::Configuration(e.to_string()))?;
      Ok(Self { client, config, provider_name: provider_name.into() })
   }

   fn base_url(&self) -> &str {
      self.config.api_base.as_deref().unwrap_or("https://api.anthropic.com/v1")
   }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
   async fn generate(&self, _context: &GenerationContext, prompt: &str) -> LlmResult<LlmResponse> {
      let temperature = self.config.temperature.clamp(0.0, 1.0);
      let body = serde_json::json!({
         "model": self.config.model,
         "max_tokens": self.config.max_tokens,
         "temperature": temperature,
         "messages": [{"role": "user", "content": prompt}],
      });

      let resp = self
         .client
         .post(format!("{}/messages", self.base_url()))
         .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
         .header("anthropic-version", "2023-06-01")
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

      let content = payload["content"][0]["text"]
         .as_str()
         .ok_or_else(|| LlmError::Generation("empty response content".to_string()))?
         .to_string();

      let tokens_used = payload["usage"]["input_tokens"]
         .as_u64()
         .zip(payload["usage"]["output_tokens"].as_u64())
         .map(|(i, o)| (i + o) as u32);
      let finish_reason = payload["stop_reason"].as_str().map(str::to_string);

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
         .post(format!("{}/messages", self.base_url()))
         .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
         .header("anthropic-version", "2023-06-01")
         .json(&serde_json::json!({"model": self.config.model, "max_tokens": 1, "messages": []}))
         .send()
         .await
         .is_ok_and(|r| r.status() != reqwest::StatusCode::UNAUTHORIZED)
   }

   fn model_info(&self) -> ModelInfo {
      ModelInfo {
         name: self.config.model.clone(),
         provider: self.provider_name.clone(),
         max_tokens: self.config.max_tokens,
         context_window: 200_000,
         capabilities: vec![
            ModelCapability::TextGeneration,
            ModelCapability::CodeGeneration,
            ModelCapability::StructuredOutput,
            ModelCapability::LargeContext,
         ],
         cost_per_1k_tokens: Some(0.003),
         supports_streaming: true,
      }
   }
}
