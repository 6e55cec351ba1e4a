pub mod anthropic;
pub mod manager;
pub mod ollama;
pub mod openai;
pub mod vllm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::GenerationContext, error::SaigenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
   TextGeneration,
   CodeGeneration,
   StructuredOutput,
   FunctionCalling,
   LargeContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
   pub name: String,
   pub provider: String,
   pub max_tokens: u32,
   pub context_window: u32,
   pub capabilities: Vec<ModelCapability>,
   pub cost_per_1k_tokens: Option<f64>,
   pub supports_streaming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
   pub content: String,
   pub tokens_used: Option<u32>,
   pub cost_estimate: Option<f64>,
   pub model_used: String,
   pub finish_reason: Option<String>,
   #[serde(default)]
   pub metadata: serde_json::Value,
}

/// Error kinds an adapter call can raise. Distinct from `SaigenError` so the
/// provider manager can pattern-match on retry policy without caring about
/// unrelated error variants (IO, YAML, ...).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
   #[error("rate limited: {0}")]
   RateLimit(String),
   #[error("authentication failed: {0}")]
   Authentication(String),
   #[error("connection failed: {0}")]
   Connection(String),
   #[error("configuration error: {0}")]
   Configuration(String),
   #[error("generation failed: {0}")]
   Generation(String),
}

impl From<LlmError> for SaigenError {
   fn from(e: LlmError) -> Self {
      match e {
         LlmError::RateLimit(m) => Self::RateLimitError { provider: String::new(), message: m },
         LlmError::Authentication(m) => Self::AuthenticationError { provider: String::new(), message: m },
         LlmError::Connection(m) => Self::ConnectionError { provider: String::new(), message: m },
         LlmError::Configuration(m) => Self::ConfigurationError(m),
         LlmError::Generation(m) => Self::GenerationError(m),
      }
   }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
   async fn generate(&self, context: &GenerationContext, prompt: &str) -> LlmResult<LlmResponse>;

   fn is_available(&self) -> bool;

   async fn validate_connection(&self) -> bool;

   fn model_info(&self) -> ModelInfo;

   fn estimate_cost(&self, tokens: u32) -> f64 {
      self.model_info().cost_per_1k_tokens.unwrap_or(0.0) * f64::from(tokens) / 1000.0
   }
}
