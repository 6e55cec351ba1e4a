//! Native vLLM adapter. Structurally identical to the OpenAI-compatible
//! adapter (vLLM serves an OpenAI-compatible API) but reports
//! deployment-specific metadata in `model_info`.

use async_trait::async_trait;

use super::{LlmError, LlmProvider, LlmResponse, LlmResult, ModelCapability, ModelInfo, openai::OpenAiProvider};
use crate::{config::ProviderConfig, context::GenerationContext};

pub struct VllmProvider {
   inner: OpenAiProvider,
   tensor_parallel_size: u32,
   gpu_memory_utilization: f32,
}

impl VllmProvider {
   /// Unlike the OpenAI adapter, vLLM deployments are typically self-hosted
   /// and unauthenticated: `api_base` is required, `api_key` is not.
   pub fn new(provider_name: impl Into<String>, config: ProviderConfig) -> LlmResult<Self> {
      if config.api_base.is_none() {
         return Err(LlmError::Configuration("vllm provider requires api_base".to_string()));
      }
      let inner = OpenAiProvider::new_unchecked(provider_name, config)?;
      Ok(Self { inner, tensor_parallel_size: 1, gpu_memory_utilization: 0.9 })
   }
}

#[async_trait]
impl LlmProvider for VllmProvider {
   async fn generate(&self, context: &GenerationContext, prompt: &str) -> LlmResult<LlmResponse> {
      self.inner.generate(context, prompt).await
   }

   fn is_available(&self) -> bool {
      self.inner.enabled() && self.inner.config_ref().api_base.is_some()
   }

   async fn validate_connection(&self) -> bool {
      self.inner.validate_connection().await
   }

   fn model_info(&self) -> ModelInfo {
      let mut info = self.inner.model_info();
      info.capabilities.push(ModelCapability::FunctionCalling);
      info
   }
}

impl VllmProvider {
   pub fn deployment_info(&self) -> (u32, f32) {
      (self.tensor_parallel_size, self.gpu_memory_utilization)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn requires_api_base_not_api_key() {
      let mut config = ProviderConfig::default();
      config.api_base = Some("http://localhost:8000/v1".to_string());
      config.api_key = None;
      let provider = VllmProvider::new("vllm", config).unwrap();
      assert!(provider.is_available());
   }

   #[test]
   fn rejects_missing_api_base() {
      let config = ProviderConfig::default();
      assert!(VllmProvider::new("vllm", config).is_err());
   }
}
