use std::time::Duration;

use async_trait::async_trait;

use super::{LlmError, LlmProvider, LlmResponse, LlmResult, ModelCapability, ModelInfo};
use crate::{config::ProviderConfig, context::GenerationContext};

pub struct OllamaProvider {
   client: reqwest::Client,
   config: ProviderConfig,
   provider_name: String,
}

impl OllamaProvider {
   pub fn new(provider_name: impl Into<String>, config: ProviderConfig) -> LlmResult<Self> {
      if config.api_base.is_none() {
         return Err(LlmError::Configuration("ollama provider requires api_base".to_string()));
      }
      let client = reqwest::Client::builder()
         .timeout(Duration::from_secs(config.timeout_secs))
         .build()
         .map_err(|e| LlmError::Configuration(e.to_string()))?;
      Ok(Self { client, config, provider_name: provider_name.into() })
   }

   fn base_url(&self) -> &str {
      self.config.api_base.as_deref().unwrap_or("http://localhost:11434")
   }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
   async fn generate(&self, _context: &GenerationContext, prompt: &str) -> LlmResult<LlmResponse> {
      let body = serde_json::json!({
         "model": self.config.model,
         "prompt": prompt,
         "stream": false,
         "options": {"temperature": self.config.temperature},
      });

      let resp = self
         .client
         .post(format!("{}/api/generate", self.base_url()))
         .json(&body)
         .send()
         .await
         .map_err(|e| LlmError::Connection(e.to_string()))?;

      let status = resp.status();
      if !status.is_success() {
         let text = resp.text().await.unwrap_or_default();
         return Err(LlmError::Generation(format!("HTTP {status}: {text}")));
      }

      let payload: serde_json::Value =
         resp.json().await.map_err(|e| LlmError::Generation(e.to_string()))?;

      let content = payload["response"]
         .as_str()
         .ok_or_else(|| LlmError::Generation("empty response content".to_string()))?
         .to_string();

      // Ollama reports token counts in some versions; fall back to a
      // whitespace-based estimate when it doesn't.
      let tokens_used = payload["eval_count"]
         .as_u64()
         .map(|n| n as u32)
         .or_else(|| Some(content.split_whitespace().count() as u32));

      Ok(LlmResponse {
         content,
         tokens_used,
         cost_estimate: Some(0.0),
         model_used: self.config.model.clone(),
         finish_reason: payload["done_reason"].as_str().map(str::to_string),
         metadata: serde_json::json!({"provider": self.provider_name, "cost_authoritative": false}),
      })
   }

   fn is_available(&self) -> bool {
      self.config.enabled
   }

   async fn validate_connection(&self) -> bool {
      self.client.get(format!("{}/api/tags", self.base_url())).send().await.is_ok_and(|r| r.status().is_success())
   }

   fn model_info(&self) -> ModelInfo {
      ModelInfo {
         name: self.config.model.clone(),
         provider: self.provider_name.clone(),
         max_tokens: self.config.max_tokens,
         context_window: 8192,
         capabilities: vec![ModelCapability::TextGeneration, ModelCapability::CodeGeneration],
         cost_per_1k_tokens: Some(0.0),
         supports_streaming: true,
      }
   }
}
