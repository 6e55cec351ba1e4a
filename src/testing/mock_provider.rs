//! A scripted [`LlmProvider`] for exercising the orchestrator and provider
//! manager without a network dependency.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::{LlmError, LlmProvider, LlmResponse, LlmResult, ModelCapability, ModelInfo};

/// One scripted outcome for a single `generate` call.
pub enum ScriptedResponse {
   Ok(String),
   Err(LlmError),
}

fn clone_scripted(r: &ScriptedResponse) -> ScriptedResponse {
   match r {
      ScriptedResponse::Ok(s) => ScriptedResponse::Ok(s.clone()),
      ScriptedResponse::Err(e) => ScriptedResponse::Err(clone_error(e)),
   }
}

fn clone_error(e: &LlmError) -> LlmError {
   match e {
      LlmError::RateLimit(m) => LlmError::RateLimit(m.clone()),
      LlmError::Authentication(m) => LlmError::Authentication(m.clone()),
      LlmError::Connection(m) => LlmError::Connection(m.clone()),
      LlmError::Configuration(m) => LlmError::Configuration(m.clone()),
      LlmError::Generation(m) => LlmError::Generation(m.clone()),
   }
}

/// An [`LlmProvider`] that replays a fixed sequence of responses in order,
/// repeating the last entry once the script is exhausted.
pub struct MockLlmProvider {
   name: String,
   script: Mutex<Vec<ScriptedResponse>>,
   available: bool,
}

impl MockLlmProvider {
   pub fn new(name: impl Into<String>, script: Vec<ScriptedResponse>) -> Self {
      Self { name: name.into(), script: Mutex::new(script), available: true }
   }

   pub fn unavailable(name: impl Into<String>) -> Self {
      Self { name: name.into(), script: Mutex::new(Vec::new()), available: false }
   }

   fn next(&self) -> ScriptedResponse {
      let mut script = self.script.lock();
      if script.len() > 1 {
         script.remove(0)
      } else if let Some(last) = script.first() {
         clone_scripted(last)
      } else {
         ScriptedResponse::Ok(String::new())
      }
   }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
   async fn generate(&self, _context: &crate::context::GenerationContext, _prompt: &str) -> LlmResult<LlmResponse> {
      match self.next() {
         ScriptedResponse::Ok(content) => Ok(LlmResponse {
            content,
            tokens_used: Some(42),
            cost_estimate: Some(0.0),
            model_used: format!("{}-mock", self.name),
            finish_reason: Some("stop".to_string()),
            metadata: serde_json::Value::Null,
         }),
         ScriptedResponse::Err(e) => Err(e),
      }
   }

   fn is_available(&self) -> bool {
      self.available
   }

   async fn validate_connection(&self) -> bool {
      self.available
   }

   fn model_info(&self) -> ModelInfo {
      ModelInfo {
         name: format!("{}-mock", self.name),
         provider: self.name.clone(),
         max_tokens: 4096,
         context_window: 8192,
         capabilities: vec![ModelCapability::TextGeneration],
         cost_per_1k_tokens: Some(0.0),
         supports_streaming: false,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn replays_scripted_responses_in_order() {
      let provider = MockLlmProvider::new(
         "test",
         vec![ScriptedResponse::Ok("first".to_string()), ScriptedResponse::Ok("second".to_string())],
      );
      let context = crate::context::GenerationContext::new("nginx", vec!["apt".to_string()]);
      let first = provider.generate(&context, "prompt").await.unwrap();
      assert_eq!(first.content, "first");
      let second = provider.generate(&context, "prompt").await.unwrap();
      assert_eq!(second.content, "second");
   }

   #[tokio::test]
   async fn repeats_last_entry_once_exhausted() {
      let provider = MockLlmProvider::new("test", vec![ScriptedResponse::Ok("only".to_string())]);
      let context = crate::context::GenerationContext::new("nginx", vec!["apt".to_string()]);
      for _ in 0..3 {
         let response = provider.generate(&context, "prompt").await.unwrap();
         assert_eq!(response.content, "only");
      }
   }
}
